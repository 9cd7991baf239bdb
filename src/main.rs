//! # Review RETL CLI (`retl`)
//!
//! The `retl` binary runs the weekly review pipeline, either end to end or
//! one stage at a time, and inspects what the stores hold.
//!
//! ## Usage
//!
//! ```bash
//! retl --config ./config/retl.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `retl init` | Create both SQLite stores and run schema migrations |
//! | `retl sources` | List configured sources and their last extract status |
//! | `retl extract [--source NAME]` | Run the extraction stage |
//! | `retl transform` | Resolve and label untransformed extracts |
//! | `retl load` | Mirror canonical data into the reporting store |
//! | `retl run` | Extract → transform → load, with stage gates |
//! | `retl stats` | Row counts and per-source extract outcomes |
//! | `retl product <id>` | Show one canonical product with its reviews |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use review_retl::classify::create_classifier;
use review_retl::config::{self, Config};
use review_retl::scrape::SiteScraper;
use review_retl::{db, migrate, pipeline, show, sources, stats, transform};

/// Review RETL: retail review harvesting, entity resolution and sync.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/retl.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "retl",
    about = "Harvest retail reviews, resolve products, and sync a reporting store",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/retl.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize both store schemas.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// List configured sources and the status of their last extract.
    Sources,

    /// Run the extraction stage.
    Extract {
        /// Only extract this configured source.
        #[arg(long)]
        source: Option<String>,
    },

    /// Transform every successful extract not yet transformed.
    Transform,

    /// Mirror sources, products and reviews into the reporting store.
    Load,

    /// Run the full pipeline.
    ///
    /// Exits non-zero if a stage gate stops the run.
    Run,

    /// Show store statistics.
    Stats,

    /// Show a canonical product and its classified reviews.
    Product {
        /// Canonical product id.
        id: i64,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let today = chrono::Local::now().date_naive();

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Databases initialized successfully.");
        }
        Commands::Sources => {
            sources::list_sources(&cfg).await?;
        }
        Commands::Extract { source } => {
            let selected = select_sources(&cfg, source.as_deref())?;
            let scraper = SiteScraper::new(&cfg.scraper, &cfg.extraction)?;
            let pool = db::connect_primary(&cfg).await?;
            let outcomes =
                pipeline::extract_sources(&pool, &scraper, &selected, &cfg.extraction, today)
                    .await;
            pool.close().await;

            println!("extract");
            for o in &outcomes {
                let mark = if o.is_success() { "✓" } else { "✗" };
                println!(
                    "  {} {}: {} ({} products, {} reviews)",
                    mark, o.source, o.status, o.products, o.reviews
                );
                if let Some(ref err) = o.error {
                    println!("      error: {}", err);
                }
            }
        }
        Commands::Transform => {
            let classifier = create_classifier(&cfg.classifier)?;
            let pool = db::connect_primary(&cfg).await?;
            let result = transform::run_transform(
                &pool,
                classifier.as_ref(),
                cfg.resolver.similarity_threshold,
            )
            .await;
            pool.close().await;
            let s = result?;

            println!("transform");
            println!("  extracts:           {}", s.extracts);
            println!("  products created:   {}", s.products_created);
            println!("  products matched:   {}", s.products_matched);
            println!("  reviews inserted:   {}", s.reviews_inserted);
            println!("  reviews skipped:    {}", s.reviews_skipped);
        }
        Commands::Load => {
            let pool = db::connect_primary(&cfg).await?;
            let result = pipeline::load_reporting(&cfg, &pool).await;
            pool.close().await;
            let s = result?;

            println!("load");
            println!("  sources:            {}", s.sources);
            println!("  products:           {}", s.products);
            println!("  reviews inserted:   {}", s.reviews_inserted);
            println!("  reviews skipped:    {}", s.reviews_skipped);
        }
        Commands::Run => {
            let scraper = SiteScraper::new(&cfg.scraper, &cfg.extraction)?;
            let classifier = create_classifier(&cfg.classifier)?;
            let report =
                pipeline::run_pipeline(&cfg, &scraper, classifier.as_ref(), today).await?;

            if let Some(stage) = report.stopped_at {
                match report.error {
                    Some(err) => eprintln!("Pipeline stopped at {} stage: {}", stage, err),
                    None => eprintln!("Pipeline stopped at {} stage", stage),
                }
                std::process::exit(1);
            }
            println!("ok");
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Product { id } => {
            show::run_show(&cfg, id).await?;
        }
    }

    Ok(())
}

fn select_sources(cfg: &Config, name: Option<&str>) -> anyhow::Result<Vec<config::SourceConfig>> {
    match name {
        None => Ok(cfg.sources.clone()),
        Some(name) => match cfg.source(name) {
            Some(source) => Ok(vec![source.clone()]),
            None => bail!("Unknown source: '{}'", name),
        },
    }
}
