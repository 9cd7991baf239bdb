//! Store statistics and health overview.
//!
//! Provides a quick summary of what the pipeline holds: raw and canonical
//! row counts, how many extracts are still waiting for the transform
//! stage, and a per-source breakdown of extract outcomes. Used by
//! `retl stats` to confirm that weekly runs are landing.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;

/// Per-source breakdown of extract outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStats {
    pub source: String,
    pub pending: i64,
    pub success: i64,
    pub failed: i64,
    pub last_extract_ts: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub raw_products: i64,
    pub raw_reviews: i64,
    pub canonical_products: i64,
    pub canonical_reviews: i64,
    pub untransformed: i64,
    pub sources: Vec<SourceStats>,
}

async fn count(pool: &SqlitePool, sql: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(sql).fetch_one(pool).await?)
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<StoreStats> {
    let mut stats = StoreStats {
        raw_products: count(pool, "SELECT COUNT(*) FROM Product_RAW").await?,
        raw_reviews: count(pool, "SELECT COUNT(*) FROM Review_RAW").await?,
        canonical_products: count(pool, "SELECT COUNT(*) FROM Product_CORE").await?,
        canonical_reviews: count(pool, "SELECT COUNT(*) FROM Review_CORE").await?,
        untransformed: count(
            pool,
            "SELECT COUNT(*) FROM Extracts WHERE extract_status = 'success' AND extract_transformed_at IS NULL",
        )
        .await?,
        sources: Vec::new(),
    };

    let rows = sqlx::query(
        r#"
        SELECT
            s.source_desc AS source,
            COALESCE(SUM(e.extract_status = 'pending'), 0) AS pending,
            COALESCE(SUM(e.extract_status = 'success'), 0) AS success,
            COALESCE(SUM(e.extract_status = 'failed'), 0) AS failed,
            MAX(e.extract_datetime) AS last_extract_ts
        FROM Sources s
        LEFT JOIN Extracts e ON e.extract_fk_source = s.source_id
        GROUP BY s.source_id
        ORDER BY s.source_desc
        "#,
    )
    .fetch_all(pool)
    .await?;

    stats.sources = rows
        .iter()
        .map(|row| SourceStats {
            source: row.get("source"),
            pending: row.get("pending"),
            success: row.get("success"),
            failed: row.get("failed"),
            last_extract_ts: row.get("last_extract_ts"),
        })
        .collect();

    Ok(stats)
}

/// Run the stats command: query the primary store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect_primary(config).await?;
    let result = collect_stats(&pool).await;
    pool.close().await;
    let stats = result?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Review RETL: Store Stats");
    println!("=========================");
    println!();
    println!("  Database:            {}", config.db.path.display());
    println!("  Size:                {}", format_bytes(db_size));
    println!();
    println!("  Raw products:        {}", stats.raw_products);
    println!("  Raw reviews:         {}", stats.raw_reviews);
    println!("  Canonical products:  {}", stats.canonical_products);
    println!("  Canonical reviews:   {}", stats.canonical_reviews);
    println!("  Awaiting transform:  {}", stats.untransformed);

    if !stats.sources.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<24} {:>8} {:>8} {:>8}   {}",
            "SOURCE", "SUCCESS", "FAILED", "PENDING", "LAST EXTRACT"
        );
        println!("  {}", "-".repeat(76));

        for s in &stats.sources {
            let last = match s.last_extract_ts {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<24} {:>8} {:>8} {:>8}   {}",
                s.source, s.success, s.failed, s.pending, last
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now ("3 days ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
