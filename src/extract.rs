//! Extraction stage: one source → one extract of raw products and reviews.
//!
//! Flow for a single source:
//!
//! ```text
//! create pending extract → fetch products → filter → Product_RAW
//!                        → per product: fetch reviews → normalize date
//!                          → hash → Review_RAW (duplicate hash ignored)
//!                        → success | failed
//! ```
//!
//! Zero fetched products or zero saved products end the extract as
//! `failed` without it being an error. A row the store rejects on a
//! constraint is logged and skipped. Any other store error after the
//! extract is created runs the compensating cleanup before recording
//! `failed`.

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::SqlitePool;

use crate::config::{ExtractionConfig, SourceConfig};
use crate::dates::normalize_date;
use crate::fingerprint::review_hash;
use crate::lifecycle::{abandon, PendingExtract};
use crate::models::{format_date, ExtractStatus, ScrapedProduct};
use crate::scrape::Scraper;

/// Primary result code shared by every SQLite constraint failure.
const SQLITE_CONSTRAINT: i32 = 19;

/// Result of one extraction run.
#[derive(Debug, Clone)]
pub struct ExtractionOutcome {
    pub source: String,
    /// `None` when the extract could not even be created.
    pub extract_id: Option<i64>,
    pub status: ExtractStatus,
    pub products: usize,
    pub reviews: usize,
    pub error: Option<String>,
}

impl ExtractionOutcome {
    /// Outcome for a source whose run stopped on a store error.
    pub fn errored(source: &str, error: &anyhow::Error) -> Self {
        Self {
            source: source.to_string(),
            extract_id: None,
            status: ExtractStatus::Failed,
            products: 0,
            reviews: 0,
            error: Some(format!("{:#}", error)),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExtractStatus::Success
    }
}

#[derive(Debug, Default)]
struct Harvest {
    fetched: usize,
    products: usize,
    reviews: usize,
}

pub async fn run_extraction(
    pool: &SqlitePool,
    scraper: &dyn Scraper,
    source: &SourceConfig,
    config: &ExtractionConfig,
    today: NaiveDate,
) -> Result<ExtractionOutcome> {
    let extract = PendingExtract::create(pool, &source.name).await?;
    let extract_id = extract.id();

    let mut outcome = ExtractionOutcome {
        source: source.name.clone(),
        extract_id: Some(extract_id),
        status: ExtractStatus::Failed,
        products: 0,
        reviews: 0,
        error: None,
    };

    let finished = match harvest(pool, scraper, source, config, today, extract_id).await {
        Ok(harvest) if harvest.products > 0 => {
            outcome.products = harvest.products;
            outcome.reviews = harvest.reviews;
            extract.mark_success(pool).await
        }
        Ok(harvest) => {
            if harvest.fetched == 0 {
                tracing::warn!(source = %source.name, "no products found");
            } else {
                tracing::warn!(
                    source = %source.name,
                    fetched = harvest.fetched,
                    "no valid products saved"
                );
            }
            extract.mark_failed(pool).await
        }
        Err(e) => {
            tracing::error!(source = %source.name, extract_id, "extraction failed: {:#}", e);
            outcome.error = Some(format!("{:#}", e));
            extract.fail(pool).await.map(|_| ExtractStatus::Failed)
        }
    };

    match finished {
        Ok(status) => {
            outcome.status = status;
            Ok(outcome)
        }
        Err(e) => {
            tracing::error!(extract_id, "could not finish extract: {:#}", e);
            if let Err(abandon_err) = abandon(pool, extract_id).await {
                tracing::error!(extract_id, "could not abandon extract: {:#}", abandon_err);
            }
            Err(e)
        }
    }
}

async fn harvest(
    pool: &SqlitePool,
    scraper: &dyn Scraper,
    source: &SourceConfig,
    config: &ExtractionConfig,
    today: NaiveDate,
    extract_id: i64,
) -> Result<Harvest> {
    let products = scraper.fetch_products(&source.url).await;
    let mut harvest = Harvest {
        fetched: products.len(),
        ..Harvest::default()
    };
    if products.is_empty() {
        return Ok(harvest);
    }

    let mut saved = Vec::new();
    for product in products.iter().filter(|p| is_valid_product(p, config)) {
        let url = absolute_url(&product.url, source.domain.as_deref());
        match insert_raw_product(pool, extract_id, product, &url).await {
            Ok(id) => saved.push((id, url)),
            Err(e) if is_row_rejection(&e) => {
                tracing::warn!(product = %product.name, "failed to save product: {}", e)
            }
            Err(e) => return Err(e),
        }
    }
    harvest.products = saved.len();
    tracing::info!(
        source = %source.name,
        fetched = harvest.fetched,
        saved = harvest.products,
        "products saved"
    );

    for (product_id, url) in &saved {
        if url.is_empty() {
            continue;
        }
        let reviews = scraper.fetch_reviews(url).await;
        for review in reviews.iter().filter(|r| !r.text.trim().is_empty()) {
            let date = normalize_date(&review.date, today);
            let hash = review_hash(&review.text, date);
            match insert_raw_review(pool, *product_id, &review.text, date, &hash).await {
                Ok(true) => harvest.reviews += 1,
                Ok(false) => tracing::debug!(hash = %hash, "duplicate raw review skipped"),
                Err(e) if is_row_rejection(&e) => tracing::warn!(
                    product_id = *product_id,
                    hash = %hash,
                    "failed to save review: {}",
                    e
                ),
                Err(e) => return Err(e),
            }
        }
    }

    Ok(harvest)
}

/// A constraint failure on one row (any `SQLITE_CONSTRAINT*` code,
/// including trigger aborts) as opposed to a store-wide error.
fn is_row_rejection(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| code & 0xff == SQLITE_CONSTRAINT),
        _ => false,
    }
}

/// Listing filter: enough reviews, a name, and no noise word in it.
pub fn is_valid_product(product: &ScrapedProduct, config: &ExtractionConfig) -> bool {
    let name = product.name.trim();
    if name.is_empty() || product.review_count < config.min_review_count {
        return false;
    }
    let lower = name.to_lowercase();
    !config
        .noise_words
        .iter()
        .any(|word| lower.contains(&word.to_lowercase()))
}

/// Join a site-relative link onto the source domain.
pub fn absolute_url(url: &str, domain: Option<&str>) -> String {
    let url = url.trim();
    match domain {
        Some(domain) if url.starts_with('/') && !url.starts_with("//") => {
            format!("{}{}", domain.trim_end_matches('/'), url)
        }
        _ => url.to_string(),
    }
}

async fn insert_raw_product(
    pool: &SqlitePool,
    extract_id: i64,
    product: &ScrapedProduct,
    url: &str,
) -> Result<i64> {
    let now = chrono::Utc::now().timestamp();
    let id = sqlx::query(
        r#"
        INSERT INTO Product_RAW (extract_fk_pr, pr_name, pr_review_count, pr_first_seen, pr_url_full)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(extract_id)
    .bind(product.name.trim())
    .bind(product.review_count)
    .bind(now)
    .bind(url)
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(id)
}

/// Returns `false` when the hash was already on file.
async fn insert_raw_review(
    pool: &SqlitePool,
    product_id: i64,
    text: &str,
    date: NaiveDate,
    hash: &str,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO Review_RAW (pr_fk_rr, rr_text, rr_date, rr_hash)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(rr_hash) DO NOTHING
        "#,
    )
    .bind(product_id)
    .bind(text)
    .bind(format_date(date))
    .bind(hash)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}
