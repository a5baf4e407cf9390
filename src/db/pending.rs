//! Pending queue snapshot persistence.

use crate::error::DatabaseError;
use crate::types::QueueEntry;
use crate::{Error, Result};

use super::{Database, PendingRow, datetime_to_millis};

impl Database {
    /// Replace the stored snapshot with `entries`
    ///
    /// The previous snapshot is deleted and the new one written inside a single
    /// transaction, so a crash mid-save leaves either the old or the new
    /// snapshot, never a mix.
    pub async fn save_pending(&self, entries: &[QueueEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin snapshot transaction: {}",
                e
            )))
        })?;

        sqlx::query("DELETE FROM pending_entries")
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear pending entries: {}",
                    e
                )))
            })?;

        for (position, entry) in entries.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO pending_entries (
                    expected_filename, destination_folder, category,
                    enqueued_at, first_seen_at, position
                )
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&entry.expected_filename)
            .bind(entry.destination_folder.to_string_lossy().into_owned())
            .bind(entry.category.as_str())
            .bind(datetime_to_millis(&entry.enqueued_at))
            .bind(entry.first_seen_at.as_ref().map(datetime_to_millis))
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert pending entry '{}': {}",
                    entry.expected_filename, e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit snapshot: {}",
                e
            )))
        })?;

        tracing::debug!(entries = entries.len(), "Saved pending queue snapshot");
        Ok(())
    }

    /// Load the stored snapshot in queue order
    ///
    /// Rows with an unrecognized category are skipped with a warning.
    pub async fn load_pending(&self) -> Result<Vec<QueueEntry>> {
        let rows = sqlx::query_as::<_, PendingRow>(
            r#"
            SELECT expected_filename, destination_folder, category,
                   enqueued_at, first_seen_at, position
            FROM pending_entries
            ORDER BY position ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to load pending entries: {}",
                e
            )))
        })?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let filename = row.expected_filename.clone();
            let category = row.category.clone();
            match row.into_entry() {
                Some(entry) => entries.push(entry),
                None => tracing::warn!(
                    filename = %filename,
                    category = %category,
                    "Skipping pending entry with unknown category"
                ),
            }
        }

        Ok(entries)
    }

    /// Number of entries in the stored snapshot
    pub async fn count_pending(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM pending_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count pending entries: {}",
                    e
                )))
            })
    }
}
