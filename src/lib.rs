//! # Review RETL
//!
//! Harvests product listings and customer reviews from retail sites,
//! resolves them into a canonical product catalog, labels every review
//! with sentiment and importance, and mirrors the result into a
//! reporting store.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────┐   ┌───────────────┐   ┌────────────┐
//! │  Scraper   │──▶│   Extract    │──▶│   Transform   │──▶│    Load    │
//! │ agent/HTML │   │ *_RAW tables │   │ resolve+label │   │ reporting  │
//! └────────────┘   └──────────────┘   └───────┬───────┘   └────────────┘
//!                                             │
//!                                      ┌──────▼──────┐
//!                                      │ Classifier  │
//!                                      │ (chat API)  │
//!                                      └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! retl init                  # create both stores
//! retl run                   # extract → transform → load
//! retl stats                 # what landed
//! retl product 42            # one canonical product with its reviews
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`dates`] | Free-form review date normalization |
//! | [`fingerprint`] | Review content fingerprint |
//! | [`lifecycle`] | Extract state machine and failure cleanup |
//! | [`scrape`] | Scraping agent client and HTML fallback |
//! | [`extract`] | Extraction stage |
//! | [`classify`] | Classification service, prompts and answer parsing |
//! | [`resolve`] | Product entity resolution |
//! | [`ingest`] | Canonical review ingestion |
//! | [`transform`] | Transform stage |
//! | [`load`] | Reporting store sync |
//! | [`pipeline`] | Stage orchestration |
//! | [`stats`] | Store statistics |
//! | [`sources`] | Configured sources and their last run |
//! | [`show`] | Canonical product lookup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod classify;
pub mod config;
pub mod dates;
pub mod db;
pub mod extract;
pub mod fingerprint;
pub mod ingest;
pub mod lifecycle;
pub mod load;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod resolve;
pub mod scrape;
pub mod show;
pub mod sources;
pub mod stats;
pub mod transform;
