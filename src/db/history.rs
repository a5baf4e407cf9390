//! Delivery history operations.

use crate::types::{DeliveryOutcome, HistoryEntry};
use crate::{Error, Result};

use super::{Database, HistoryRow, NewHistoryEntry};

impl Database {
    /// Record an entry that left the queue
    ///
    /// Called once per entry, when it is delivered or given up on.
    pub async fn insert_history(&self, entry: &NewHistoryEntry) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO delivery_history (
                filename, category, destination, outcome, size_bytes, completed_at
            )
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.filename)
        .bind(entry.category.as_str())
        .bind(entry.destination.to_string_lossy().into_owned())
        .bind(entry.outcome.to_i32())
        .bind(entry.size_bytes as i64)
        .bind(entry.completed_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Sqlx)?;

        Ok(result.last_insert_rowid())
    }

    /// Query history with pagination and optional outcome filter
    ///
    /// Most recent first.
    pub async fn query_history(
        &self,
        outcome_filter: Option<DeliveryOutcome>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let query = if let Some(outcome) = outcome_filter {
            sqlx::query_as::<_, HistoryRow>(
                r#"
                SELECT id, filename, category, destination, outcome, size_bytes, completed_at
                FROM delivery_history
                WHERE outcome = ?
                ORDER BY completed_at DESC, id DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(outcome.to_i32())
            .bind(limit as i64)
            .bind(offset as i64)
        } else {
            sqlx::query_as::<_, HistoryRow>(
                r#"
                SELECT id, filename, category, destination, outcome, size_bytes, completed_at
                FROM delivery_history
                ORDER BY completed_at DESC, id DESC
                LIMIT ? OFFSET ?
                "#,
            )
            .bind(limit as i64)
            .bind(offset as i64)
        };

        let rows = query.fetch_all(&self.pool).await.map_err(Error::Sqlx)?;

        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }

    /// Count history entries (optionally filtered by outcome)
    pub async fn count_history(&self, outcome_filter: Option<DeliveryOutcome>) -> Result<i64> {
        let count = if let Some(outcome) = outcome_filter {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM delivery_history WHERE outcome = ?")
                .bind(outcome.to_i32())
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Sqlx)?
        } else {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM delivery_history")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Sqlx)?
        };

        Ok(count)
    }
}
