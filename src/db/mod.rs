//! Database layer for debridarr
//!
//! Handles SQLite persistence for the pending match queue snapshot, runtime
//! state and delivery history.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`]: Database lifecycle, schema migrations, corrupt-file recovery
//! - [`pending`]: Queue snapshot save/load
//! - [`history`]: Delivery history
//! - [`state`]: Runtime state (shutdown tracking)

use crate::types::{Category, DeliveryOutcome, HistoryEntry, QueueEntry};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

mod history;
mod migrations;
mod pending;
mod state;

/// Pending queue row (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct PendingRow {
    /// Lowercased expected filename (primary key)
    pub expected_filename: String,
    /// Destination folder
    pub destination_folder: String,
    /// Category name
    pub category: String,
    /// Unix timestamp in milliseconds when the entry was enqueued
    pub enqueued_at: i64,
    /// Unix timestamp in milliseconds of the worker's first attempt
    pub first_seen_at: Option<i64>,
    /// Queue position at snapshot time
    pub position: i64,
}

impl PendingRow {
    /// Convert into a queue entry; `None` if the stored category is unknown
    pub fn into_entry(self) -> Option<QueueEntry> {
        let category = Category::parse(&self.category)?;
        Some(QueueEntry {
            expected_filename: self.expected_filename,
            destination_folder: PathBuf::from(self.destination_folder),
            category,
            enqueued_at: millis_to_datetime(self.enqueued_at),
            first_seen_at: self.first_seen_at.map(millis_to_datetime),
        })
    }
}

/// New history entry to be inserted into the database
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    /// Expected filename
    pub filename: String,
    /// Originating category
    pub category: Category,
    /// Destination folder
    pub destination: PathBuf,
    /// How the entry ended
    pub outcome: DeliveryOutcome,
    /// Bytes copied (0 for timeouts)
    pub size_bytes: u64,
    /// Unix timestamp when the entry left the queue
    pub completed_at: i64,
}

/// History record from database (raw from SQLite)
#[derive(Debug, Clone, FromRow)]
pub struct HistoryRow {
    /// Unique database ID
    pub id: i64,
    /// Expected filename
    pub filename: String,
    /// Category name
    pub category: String,
    /// Destination folder
    pub destination: String,
    /// Outcome code
    pub outcome: i32,
    /// Bytes copied
    pub size_bytes: i64,
    /// Unix timestamp when the entry left the queue
    pub completed_at: i64,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        HistoryEntry {
            id: row.id,
            filename: row.filename,
            // Only known categories are ever written
            category: Category::parse(&row.category).unwrap_or(Category::Radarr),
            destination: PathBuf::from(row.destination),
            outcome: DeliveryOutcome::from_i32(row.outcome),
            size_bytes: row.size_bytes.max(0) as u64,
            completed_at: Utc
                .timestamp_opt(row.completed_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
        }
    }
}

pub(crate) fn datetime_to_millis(value: &DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

pub(crate) fn millis_to_datetime(value: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(value)
        .single()
        .unwrap_or_else(Utc::now)
}

/// Database handle for debridarr
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
