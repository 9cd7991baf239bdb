use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::models::ExtractStatus;

/// Status of the most recent extract for a source name, if any.
pub async fn last_extract_status(pool: &SqlitePool, source: &str) -> Result<Option<ExtractStatus>> {
    let status: Option<String> = sqlx::query_scalar(
        r#"
        SELECT e.extract_status
        FROM Extracts e
        JOIN Sources s ON s.source_id = e.extract_fk_source
        WHERE s.source_desc = ?
        ORDER BY e.extract_id DESC
        LIMIT 1
        "#,
    )
    .bind(source)
    .fetch_optional(pool)
    .await?;

    status.map(|s| s.parse()).transpose()
}

pub async fn list_sources(config: &Config) -> Result<()> {
    let pool = db::connect_primary(config).await?;

    println!("{:<24} {:<12} URL", "SOURCE", "LAST RUN");
    for source in &config.sources {
        let status = match last_extract_status(&pool, &source.name).await {
            Ok(Some(status)) => status.to_string(),
            Ok(None) => "never".to_string(),
            Err(_) => "unknown".to_string(),
        };
        println!("{:<24} {:<12} {}", source.name, status, source.url);
    }

    if config.sources.is_empty() {
        println!("(no sources configured)");
    }

    pool.close().await;
    Ok(())
}
