//! Canonical product retrieval by id.
//!
//! Fetches one canonical product with its classified reviews from the
//! primary store. Used by `retl product <id>`.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::load::canonical_review_from_row;
use crate::models::{format_date, CanonicalProduct, CanonicalReview};

#[derive(Debug, Clone)]
pub struct ProductView {
    pub product: CanonicalProduct,
    /// Reviews with the name of the source they came from, oldest first.
    pub reviews: Vec<(CanonicalReview, String)>,
}

pub async fn get_product(pool: &SqlitePool, id: i64) -> Result<ProductView> {
    let row = sqlx::query("SELECT pc_id, pc_desc FROM Product_CORE WHERE pc_id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        bail!("product not found: {}", id);
    };

    let product = CanonicalProduct {
        id: row.get("pc_id"),
        description: row.get("pc_desc"),
    };

    let rows = sqlx::query(
        r#"
        SELECT r.rc_id, r.pc_fk_rc, r.rc_source, r.rc_text, r.rc_date,
               r.rc_sentiment, r.rc_importance, r.rc_hash, s.source_desc
        FROM Review_CORE r
        JOIN Sources s ON s.source_id = r.rc_source
        WHERE r.pc_fk_rc = ?
        ORDER BY r.rc_date ASC, r.rc_id ASC
        "#,
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let reviews = rows
        .iter()
        .map(|row| Ok((canonical_review_from_row(row)?, row.get("source_desc"))))
        .collect::<Result<Vec<(CanonicalReview, String)>>>()?;

    Ok(ProductView { product, reviews })
}

/// CLI entry point: print one product and its reviews.
pub async fn run_show(config: &Config, id: i64) -> Result<()> {
    let pool = db::connect_primary(config).await?;
    let result = get_product(&pool, id).await;
    pool.close().await;
    let view = result?;

    println!("--- Product ---");
    println!("id:          {}", view.product.id);
    println!("description: {}", view.product.description);
    println!();

    println!("--- Reviews ({}) ---", view.reviews.len());
    for (review, source) in &view.reviews {
        println!(
            "[{}] {} {}/{} ({})",
            review.id,
            format_date(review.date),
            review.labels.sentiment.as_str(),
            review.labels.importance.as_str(),
            source
        );
        println!("{}", review.text);
        println!();
    }

    Ok(())
}
