//! Transform stage: raw rows of successful extracts → canonical rows.
//!
//! Extracts are picked up once. Each `success` extract without a
//! transform watermark is processed and then stamped, so running the
//! stage again only sees extracts that arrived since.
//!
//! Per extract, the distinct raw product names are resolved against the
//! canonical catalog as one batch. Then, name by name, reviews are
//! prepared (dedup + classification) and the canonical product row, if
//! new, is written together with its reviews in one transaction. The same
//! transaction stamps the name's raw products, so if the stage stops
//! partway through an extract a rerun only picks up the names that did
//! not commit.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;

use crate::classify::Classifier;
use crate::ingest::{insert_reviews, prepare_reviews};
use crate::lifecycle::{mark_transformed, pending_transform};
use crate::models::{parse_date, CanonicalProduct, Extract, RawProduct, RawReview};
use crate::resolve::ProductResolver;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformSummary {
    pub extracts: usize,
    pub products_created: usize,
    pub products_matched: usize,
    pub reviews_inserted: usize,
    pub reviews_skipped: usize,
}

impl TransformSummary {
    fn absorb(&mut self, other: &TransformSummary) {
        self.extracts += other.extracts;
        self.products_created += other.products_created;
        self.products_matched += other.products_matched;
        self.reviews_inserted += other.reviews_inserted;
        self.reviews_skipped += other.reviews_skipped;
    }
}

pub async fn run_transform(
    pool: &SqlitePool,
    classifier: &dyn Classifier,
    threshold: u8,
) -> Result<TransformSummary> {
    let extracts = pending_transform(pool).await?;
    let mut total = TransformSummary::default();

    if extracts.is_empty() {
        tracing::info!("no untransformed extracts");
        return Ok(total);
    }

    tracing::info!(
        extracts = extracts.len(),
        model = classifier.model_name(),
        "transforming extracts"
    );

    for extract in &extracts {
        let summary = transform_extract(pool, classifier, threshold, extract).await?;
        mark_transformed(pool, extract.id).await?;
        tracing::info!(
            extract_id = extract.id,
            created = summary.products_created,
            matched = summary.products_matched,
            reviews = summary.reviews_inserted,
            skipped = summary.reviews_skipped,
            "extract transformed"
        );
        total.absorb(&summary);
    }

    Ok(total)
}

pub async fn transform_extract(
    pool: &SqlitePool,
    classifier: &dyn Classifier,
    threshold: u8,
    extract: &Extract,
) -> Result<TransformSummary> {
    let mut summary = TransformSummary {
        extracts: 1,
        ..TransformSummary::default()
    };

    let raw_products = load_raw_products(pool, extract.id).await?;
    if raw_products.is_empty() {
        return Ok(summary);
    }

    // Identical names inside one extract share a canonical product.
    let mut by_name: BTreeMap<&str, Vec<i64>> = BTreeMap::new();
    for product in &raw_products {
        by_name.entry(product.name.as_str()).or_default().push(product.id);
    }

    let catalog = load_catalog(pool).await?;
    let names: Vec<&str> = by_name.keys().copied().collect();
    let resolution = ProductResolver::new(classifier, threshold)
        .resolve(&names, &catalog)
        .await;

    for (name, product_ids) in &by_name {
        let mut raw_reviews = Vec::new();
        for product_id in product_ids {
            raw_reviews.extend(load_raw_reviews(pool, *product_id).await?);
        }

        let batch = prepare_reviews(pool, classifier, &raw_reviews).await;
        summary.reviews_skipped += batch.skipped;

        let mut tx = pool.begin().await?;

        let canonical_id = match resolution.canonical_id(name) {
            Some(id) => {
                summary.products_matched += 1;
                id
            }
            None => {
                let id = sqlx::query("INSERT INTO Product_CORE (pc_desc) VALUES (?)")
                    .bind(*name)
                    .execute(&mut *tx)
                    .await?
                    .last_insert_rowid();
                tracing::info!(name = %name, canonical_id = id, "created canonical product");
                summary.products_created += 1;
                id
            }
        };

        summary.reviews_inserted +=
            insert_reviews(&mut tx, canonical_id, extract.source_id, &batch.reviews).await;

        let now = chrono::Utc::now().timestamp();
        for product_id in product_ids {
            sqlx::query("UPDATE Product_RAW SET pr_transformed_at = ? WHERE pr_id = ?")
                .bind(now)
                .bind(*product_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
    }

    Ok(summary)
}

/// Raw products of an extract that no transform has committed yet.
pub async fn load_raw_products(pool: &SqlitePool, extract_id: i64) -> Result<Vec<RawProduct>> {
    let rows = sqlx::query(
        r#"
        SELECT pr_id, extract_fk_pr, pr_name, pr_review_count, pr_first_seen, pr_url_full
        FROM Product_RAW
        WHERE extract_fk_pr = ? AND pr_transformed_at IS NULL
        ORDER BY pr_id
        "#,
    )
    .bind(extract_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| RawProduct {
            id: row.get("pr_id"),
            extract_id: row.get("extract_fk_pr"),
            name: row.get("pr_name"),
            review_count: row.get("pr_review_count"),
            first_seen: row.get("pr_first_seen"),
            url: row.get("pr_url_full"),
        })
        .collect())
}

pub async fn load_raw_reviews(pool: &SqlitePool, product_id: i64) -> Result<Vec<RawReview>> {
    let rows = sqlx::query(
        "SELECT rr_id, pr_fk_rr, rr_text, rr_date, rr_hash FROM Review_RAW WHERE pr_fk_rr = ? ORDER BY rr_id",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let date: String = row.get("rr_date");
            Ok(RawReview {
                id: row.get("rr_id"),
                product_id: row.get("pr_fk_rr"),
                text: row.get("rr_text"),
                date: parse_date(&date)?,
                hash: row.get("rr_hash"),
            })
        })
        .collect()
}

/// The whole canonical catalog, in id order.
pub async fn load_catalog(pool: &SqlitePool) -> Result<Vec<CanonicalProduct>> {
    let rows = sqlx::query("SELECT pc_id, pc_desc FROM Product_CORE ORDER BY pc_id")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| CanonicalProduct {
            id: row.get("pc_id"),
            description: row.get("pc_desc"),
        })
        .collect())
}
