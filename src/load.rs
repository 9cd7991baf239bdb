//! Load stage: mirror sources, canonical products and canonical reviews
//! into the reporting store.
//!
//! The reporting store numbers its own rows. Cross-store identity is
//! carried by `source_origin_id` / `pc_origin_id` (the primary-store id)
//! for sources and products, and by the content fingerprint for reviews.
//! Review foreign keys are translated through the origin-id mapping.
//!
//! Order is sources, products, reviews; each table is written in one
//! transaction on the reporting store. Running the stage twice changes
//! nothing the second time.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::models::{format_date, parse_date, CanonicalReview, Labels, Source};
use crate::transform::load_catalog;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub sources: usize,
    pub products: usize,
    pub reviews_inserted: usize,
    pub reviews_skipped: usize,
}

pub async fn run_load(primary: &SqlitePool, reporting: &SqlitePool) -> Result<LoadSummary> {
    let mut summary = LoadSummary::default();

    // Sources
    let sources = load_sources(primary).await?;
    let mut tx = reporting.begin().await?;
    for source in &sources {
        sqlx::query(
            r#"
            INSERT INTO Sources (source_origin_id, source_desc) VALUES (?, ?)
            ON CONFLICT(source_origin_id) DO UPDATE SET source_desc = excluded.source_desc
            "#,
        )
        .bind(source.id)
        .bind(&source.name)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    summary.sources = sources.len();
    tracing::info!(count = summary.sources, "sources loaded");

    // Products
    let products = load_catalog(primary).await?;
    let mut tx = reporting.begin().await?;
    for product in &products {
        sqlx::query(
            r#"
            INSERT INTO Product_CORE (pc_origin_id, pc_desc) VALUES (?, ?)
            ON CONFLICT(pc_origin_id) DO UPDATE SET pc_desc = excluded.pc_desc
            "#,
        )
        .bind(product.id)
        .bind(&product.description)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    summary.products = products.len();
    tracing::info!(count = summary.products, "products loaded");

    // Reviews
    let source_ids = origin_map(reporting, "SELECT source_origin_id, source_id FROM Sources").await?;
    let product_ids = origin_map(reporting, "SELECT pc_origin_id, pc_id FROM Product_CORE").await?;

    let reviews = load_canonical_reviews(primary).await?;
    let mut tx = reporting.begin().await?;
    for review in &reviews {
        let (Some(&product_id), Some(&source_id)) = (
            product_ids.get(&review.product_id),
            source_ids.get(&review.source_id),
        ) else {
            tracing::warn!(review_id = review.id, "review references unknown product or source");
            summary.reviews_skipped += 1;
            continue;
        };

        let result = sqlx::query(
            r#"
            INSERT INTO Review_CORE (pc_fk_rc, rc_text, rc_source, rc_date, rc_sentiment, rc_importance, rc_hash)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(rc_hash) DO NOTHING
            "#,
        )
        .bind(product_id)
        .bind(&review.text)
        .bind(source_id)
        .bind(format_date(review.date))
        .bind(review.labels.sentiment.as_str())
        .bind(review.labels.importance.as_str())
        .bind(&review.hash)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            summary.reviews_inserted += 1;
        } else {
            summary.reviews_skipped += 1;
        }
    }
    tx.commit().await?;
    tracing::info!(
        inserted = summary.reviews_inserted,
        skipped = summary.reviews_skipped,
        "reviews loaded"
    );

    Ok(summary)
}

async fn origin_map(pool: &SqlitePool, query: &str) -> Result<HashMap<i64, i64>> {
    let rows: Vec<(i64, i64)> = sqlx::query_as(query).fetch_all(pool).await?;
    Ok(rows.into_iter().collect())
}

pub async fn load_sources(pool: &SqlitePool) -> Result<Vec<Source>> {
    let rows = sqlx::query("SELECT source_id, source_desc FROM Sources ORDER BY source_id")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| Source {
            id: row.get("source_id"),
            name: row.get("source_desc"),
        })
        .collect())
}

pub async fn load_canonical_reviews(pool: &SqlitePool) -> Result<Vec<CanonicalReview>> {
    let rows = sqlx::query(
        r#"
        SELECT rc_id, pc_fk_rc, rc_source, rc_text, rc_date, rc_sentiment, rc_importance, rc_hash
        FROM Review_CORE
        ORDER BY rc_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter().map(canonical_review_from_row).collect()
}

pub(crate) fn canonical_review_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CanonicalReview> {
    let date: String = row.get("rc_date");
    let sentiment: String = row.get("rc_sentiment");
    let importance: String = row.get("rc_importance");
    Ok(CanonicalReview {
        id: row.get("rc_id"),
        product_id: row.get("pc_fk_rc"),
        source_id: row.get("rc_source"),
        text: row.get("rc_text"),
        date: parse_date(&date)?,
        labels: Labels {
            sentiment: sentiment.parse()?,
            importance: importance.parse()?,
        },
        hash: row.get("rc_hash"),
    })
}
