use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create (or confirm) the schema of both stores.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let primary = db::connect_primary(config).await?;
    let result = migrate_primary(&primary).await;
    primary.close().await;
    result?;

    let reporting = db::connect_reporting(config).await?;
    let result = migrate_reporting(&reporting).await;
    reporting.close().await;
    result
}

pub async fn migrate_primary(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Sources (
            source_id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_desc TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // extract_transformed_at is the transform watermark; status itself only
    // ever moves pending -> success | failed.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Extracts (
            extract_id INTEGER PRIMARY KEY AUTOINCREMENT,
            extract_fk_source INTEGER NOT NULL,
            extract_datetime INTEGER NOT NULL,
            extract_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (extract_status IN ('pending', 'success', 'failed')),
            extract_transformed_at INTEGER,
            FOREIGN KEY (extract_fk_source) REFERENCES Sources(source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS extracts_status_write_once
        BEFORE UPDATE OF extract_status ON Extracts
        WHEN OLD.extract_status <> 'pending'
        BEGIN
            SELECT RAISE(ABORT, 'extract status is terminal');
        END
        "#,
    )
    .execute(pool)
    .await?;

    // pr_transformed_at marks raw products already folded into the
    // canonical tables, so a transform that stopped mid-extract resumes
    // where it left off.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Product_RAW (
            pr_id INTEGER PRIMARY KEY AUTOINCREMENT,
            extract_fk_pr INTEGER NOT NULL,
            pr_name TEXT NOT NULL,
            pr_review_count INTEGER NOT NULL,
            pr_first_seen INTEGER NOT NULL,
            pr_url_full TEXT NOT NULL,
            pr_transformed_at INTEGER,
            FOREIGN KEY (extract_fk_pr) REFERENCES Extracts(extract_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Review_RAW (
            rr_id INTEGER PRIMARY KEY AUTOINCREMENT,
            pr_fk_rr INTEGER NOT NULL,
            rr_text TEXT NOT NULL,
            rr_date TEXT NOT NULL,
            rr_hash TEXT NOT NULL UNIQUE,
            FOREIGN KEY (pr_fk_rr) REFERENCES Product_RAW(pr_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Product_CORE (
            pc_id INTEGER PRIMARY KEY AUTOINCREMENT,
            pc_desc TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Review_CORE (
            rc_id INTEGER PRIMARY KEY AUTOINCREMENT,
            pc_fk_rc INTEGER NOT NULL,
            rc_text TEXT NOT NULL,
            rc_source INTEGER NOT NULL,
            rc_date TEXT NOT NULL,
            rc_sentiment TEXT NOT NULL CHECK (rc_sentiment IN ('negative', 'neutral', 'positive')),
            rc_importance TEXT NOT NULL CHECK (rc_importance IN ('high', 'low')),
            rc_hash TEXT NOT NULL UNIQUE,
            FOREIGN KEY (pc_fk_rc) REFERENCES Product_CORE(pc_id),
            FOREIGN KEY (rc_source) REFERENCES Sources(source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_extracts_status ON Extracts(extract_status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_product_raw_extract ON Product_RAW(extract_fk_pr)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_review_raw_product ON Review_RAW(pr_fk_rr)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_review_core_product ON Review_CORE(pc_fk_rc)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Reporting store schema. Ids are local to this store; `*_origin_id`
/// holds the primary-store id and is the upsert key.
pub async fn migrate_reporting(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Sources (
            source_id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_origin_id INTEGER NOT NULL UNIQUE,
            source_desc TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Product_CORE (
            pc_id INTEGER PRIMARY KEY AUTOINCREMENT,
            pc_origin_id INTEGER NOT NULL UNIQUE,
            pc_desc TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS Review_CORE (
            rc_id INTEGER PRIMARY KEY AUTOINCREMENT,
            pc_fk_rc INTEGER NOT NULL,
            rc_text TEXT NOT NULL,
            rc_source INTEGER NOT NULL,
            rc_date TEXT NOT NULL,
            rc_sentiment TEXT NOT NULL,
            rc_importance TEXT NOT NULL,
            rc_hash TEXT NOT NULL UNIQUE,
            FOREIGN KEY (pc_fk_rc) REFERENCES Product_CORE(pc_id),
            FOREIGN KEY (rc_source) REFERENCES Sources(source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
