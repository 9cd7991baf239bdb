//! Extract lifecycle: `pending` → `success` | `failed`.
//!
//! A [`PendingExtract`] is the only way to hold an extract that can still
//! change status. Both terminal transitions consume it, so a second
//! transition cannot be written. The store backs this up: the UPDATE only
//! matches rows still in `pending`, and a trigger rejects any later change.
//!
//! On failure, [`PendingExtract::fail`] deletes every raw review and raw
//! product owned by the extract before recording `failed`; a failed
//! extract never leaves raw rows behind.

use anyhow::{bail, Context, Result};
use sqlx::{Row, SqliteConnection, SqlitePool};

use crate::models::{Extract, ExtractStatus};

/// Rows removed by [`PendingExtract::cleanup`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub reviews_deleted: u64,
    pub products_deleted: u64,
}

/// An extraction attempt that has not reached a terminal status yet.
#[derive(Debug)]
pub struct PendingExtract {
    id: i64,
    source_id: i64,
}

impl PendingExtract {
    /// Register the source if unseen and open a new `pending` extract.
    pub async fn create(pool: &SqlitePool, source_name: &str) -> Result<Self> {
        let source_id = ensure_source(pool, source_name).await?;
        let now = chrono::Utc::now().timestamp();

        let id = sqlx::query(
            "INSERT INTO Extracts (extract_fk_source, extract_datetime, extract_status) VALUES (?, ?, 'pending')",
        )
        .bind(source_id)
        .bind(now)
        .execute(pool)
        .await?
        .last_insert_rowid();

        tracing::info!(extract_id = id, source = source_name, "created extract");
        Ok(Self { id, source_id })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn source_id(&self) -> i64 {
        self.source_id
    }

    pub async fn mark_success(self, pool: &SqlitePool) -> Result<ExtractStatus> {
        finish(pool, self.id, ExtractStatus::Success).await
    }

    /// Record `failed` without touching raw rows. Use [`fail`](Self::fail)
    /// when rows may already have been written.
    pub async fn mark_failed(self, pool: &SqlitePool) -> Result<ExtractStatus> {
        finish(pool, self.id, ExtractStatus::Failed).await
    }

    /// Delete the raw reviews (via their products) and raw products owned by
    /// this extract.
    pub async fn cleanup(&self, pool: &SqlitePool) -> Result<CleanupReport> {
        let mut tx = pool.begin().await?;
        let report = delete_owned_rows(&mut tx, self.id).await?;
        tx.commit().await?;

        tracing::info!(
            extract_id = self.id,
            reviews = report.reviews_deleted,
            products = report.products_deleted,
            "cleaned up extract"
        );
        Ok(report)
    }

    /// Compensating failure path: cleanup, then `failed`.
    pub async fn fail(self, pool: &SqlitePool) -> Result<CleanupReport> {
        let report = self.cleanup(pool).await?;
        self.mark_failed(pool).await?;
        Ok(report)
    }
}

async fn delete_owned_rows(conn: &mut SqliteConnection, extract_id: i64) -> Result<CleanupReport> {
    let reviews = sqlx::query(
        "DELETE FROM Review_RAW WHERE pr_fk_rr IN (SELECT pr_id FROM Product_RAW WHERE extract_fk_pr = ?)",
    )
    .bind(extract_id)
    .execute(&mut *conn)
    .await?;

    let products = sqlx::query("DELETE FROM Product_RAW WHERE extract_fk_pr = ?")
        .bind(extract_id)
        .execute(&mut *conn)
        .await?;

    Ok(CleanupReport {
        reviews_deleted: reviews.rows_affected(),
        products_deleted: products.rows_affected(),
    })
}

/// Recovery for an extract whose [`PendingExtract`] was consumed by a
/// transition that errored. If the row is still `pending`, its raw rows
/// are deleted and it is marked `failed` in one transaction. Returns
/// `false` when the extract had already left `pending`.
pub async fn abandon(pool: &SqlitePool, extract_id: i64) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let status: Option<String> =
        sqlx::query_scalar("SELECT extract_status FROM Extracts WHERE extract_id = ?")
            .bind(extract_id)
            .fetch_optional(&mut *tx)
            .await?;
    if status.as_deref() != Some(ExtractStatus::Pending.as_str()) {
        return Ok(false);
    }

    delete_owned_rows(&mut tx, extract_id).await?;
    sqlx::query(
        "UPDATE Extracts SET extract_status = 'failed' WHERE extract_id = ? AND extract_status = 'pending'",
    )
    .bind(extract_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::warn!(extract_id, "abandoned extract as failed");
    Ok(true)
}

async fn finish(pool: &SqlitePool, extract_id: i64, status: ExtractStatus) -> Result<ExtractStatus> {
    let result = sqlx::query(
        "UPDATE Extracts SET extract_status = ? WHERE extract_id = ? AND extract_status = 'pending'",
    )
    .bind(status.as_str())
    .bind(extract_id)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to mark extract {} as {}", extract_id, status))?;

    if result.rows_affected() == 0 {
        bail!("extract {} is not pending", extract_id);
    }

    tracing::info!(extract_id, status = status.as_str(), "extract finished");
    Ok(status)
}

/// Id of the source named `name`, inserting it on first sighting.
pub async fn ensure_source(pool: &SqlitePool, name: &str) -> Result<i64> {
    sqlx::query("INSERT INTO Sources (source_desc) VALUES (?) ON CONFLICT(source_desc) DO NOTHING")
        .bind(name)
        .execute(pool)
        .await?;

    let id: i64 = sqlx::query_scalar("SELECT source_id FROM Sources WHERE source_desc = ?")
        .bind(name)
        .fetch_one(pool)
        .await?;

    Ok(id)
}

pub async fn extract_status(pool: &SqlitePool, extract_id: i64) -> Result<Option<ExtractStatus>> {
    let status: Option<String> =
        sqlx::query_scalar("SELECT extract_status FROM Extracts WHERE extract_id = ?")
            .bind(extract_id)
            .fetch_optional(pool)
            .await?;

    status.map(|s| s.parse()).transpose()
}

/// Successful extracts whose raw rows have not been transformed yet,
/// oldest first.
pub async fn pending_transform(pool: &SqlitePool) -> Result<Vec<Extract>> {
    let rows = sqlx::query(
        r#"
        SELECT extract_id, extract_fk_source, extract_datetime, extract_status, extract_transformed_at
        FROM Extracts
        WHERE extract_status = 'success' AND extract_transformed_at IS NULL
        ORDER BY extract_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let status: String = row.get("extract_status");
            Ok(Extract {
                id: row.get("extract_id"),
                source_id: row.get("extract_fk_source"),
                created_at: row.get("extract_datetime"),
                status: status.parse()?,
                transformed_at: row.get("extract_transformed_at"),
            })
        })
        .collect()
}

/// Stamp the transform watermark on a successful extract.
pub async fn mark_transformed(pool: &SqlitePool, extract_id: i64) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        "UPDATE Extracts SET extract_transformed_at = ? WHERE extract_id = ? AND extract_status = 'success' AND extract_transformed_at IS NULL",
    )
    .bind(now)
    .bind(extract_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        bail!("extract {} is not an untransformed success", extract_id);
    }
    Ok(())
}
