//! Review ingestion into `Review_CORE`.
//!
//! Work is split in two so that no classification call happens while a
//! write transaction is open:
//!
//! 1. [`prepare_reviews`] drops reviews whose fingerprint is already
//!    canonical, recomputes the fingerprint for the rest and classifies
//!    each one (one call per review).
//! 2. [`insert_reviews`] writes the prepared rows on the caller's
//!    connection, normally inside the transaction that also created the
//!    canonical product.
//!
//! Per-review failures are logged and skipped. A duplicate fingerprint is
//! an expected outcome and only shows up at debug level.

use anyhow::Result;
use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashSet;

use crate::classify::{classify_review, Classifier};
use crate::fingerprint::review_hash;
use crate::models::{format_date, Labels, RawReview};

/// A review ready to be written as canonical.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedReview {
    pub text: String,
    pub date: NaiveDate,
    pub labels: Labels,
    pub hash: String,
}

#[derive(Debug, Default)]
pub struct PreparedBatch {
    pub reviews: Vec<PreparedReview>,
    /// Reviews already canonical (or repeated within the batch).
    pub skipped: usize,
}

pub async fn canonical_hash_exists(pool: &SqlitePool, hash: &str) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT rc_id FROM Review_CORE WHERE rc_hash = ?")
        .bind(hash)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

pub async fn prepare_reviews(
    pool: &SqlitePool,
    classifier: &dyn Classifier,
    raw: &[RawReview],
) -> PreparedBatch {
    let mut batch = PreparedBatch::default();
    let mut seen = HashSet::new();

    for review in raw {
        let hash = review_hash(&review.text, review.date);

        if !seen.insert(hash.clone()) {
            batch.skipped += 1;
            continue;
        }

        match canonical_hash_exists(pool, &hash).await {
            Ok(true) => {
                tracing::debug!(hash = %hash, "review already canonical");
                batch.skipped += 1;
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(raw_review = review.id, "dedup check failed, skipping review: {}", e);
                continue;
            }
        }

        let labels = classify_review(classifier, &review.text).await;
        batch.reviews.push(PreparedReview {
            text: review.text.clone(),
            date: review.date,
            labels,
            hash,
        });
    }

    batch
}

/// Insert prepared reviews; returns how many rows were written.
pub async fn insert_reviews(
    conn: &mut SqliteConnection,
    product_id: i64,
    source_id: i64,
    reviews: &[PreparedReview],
) -> usize {
    let mut inserted = 0;

    for review in reviews {
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
        .execute(&mut *conn)
        .await;

        match result {
            Ok(r) if r.rows_affected() > 0 => inserted += 1,
            Ok(_) => tracing::debug!(hash = %review.hash, "review already canonical"),
            Err(e) => tracing::warn!(hash = %review.hash, "failed to insert review: {}", e),
        }
    }

    inserted
}
