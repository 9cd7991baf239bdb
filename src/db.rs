//! SQLite connection management.
//!
//! Both the primary store (raw + canonical tables) and the reporting store
//! are plain SQLite files. Each stage receives an explicit pool handle and
//! the caller closes it when the stage finishes, whether or not it failed.
//!
//! # Write-Ahead Logging (WAL)
//!
//! WAL mode is enabled so `retl stats` or a reporting consumer can read
//! while a run is writing.
//!
//! Foreign keys are enforced (sqlx turns the pragma on by default); the
//! raw-row cleanup relies on deleting reviews before their products.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::config::Config;

/// Open a connection pool to the SQLite database at `db_path`.
///
/// - Creates the database file and parent directories if they don't exist.
/// - Enables WAL journal mode.
/// - Returns a pool with up to 5 connections.
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    Ok(pool)
}

/// Pool for the primary store (`[db].path`).
pub async fn connect_primary(config: &Config) -> Result<SqlitePool> {
    connect(&config.db.path).await
}

/// Pool for the reporting store (`[reporting].path`).
pub async fn connect_reporting(config: &Config) -> Result<SqlitePool> {
    connect(&config.reporting.path).await
}
