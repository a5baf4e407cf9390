//! Error types for debridarr
//!
//! This module provides the error taxonomy for the whole pipeline:
//! - Intake errors (invalid descriptor, submission rejected, acquisition unavailable)
//! - Reconciliation errors (transfer failure, match timeout)
//! - Persistence errors (snapshot read/write, database lifecycle)
//! - Remote API errors carrying the status code and response body

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::types::AcquisitionId;

/// Result type alias for debridarr operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for debridarr
///
/// Each variant includes enough context (request identity, path, status code or
/// response body) to diagnose a failure from the log alone.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "RD_APITOKEN")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A remote HTTP API answered with an unexpected status
    #[error("{service} API returned {status}: {body}")]
    Api {
        /// Which remote service answered ("real-debrid", "sonarr", "radarr")
        service: String,
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// The acquisition service rejected the link
    #[error("submission rejected for {link}: {reason}")]
    Submission {
        /// The link that was submitted
        link: String,
        /// Why the service rejected it
        reason: String,
    },

    /// The acquisition service cannot fulfill the request
    #[error("acquisition {id} unavailable (status: {status})")]
    AcquisitionUnavailable {
        /// Remote handle of the acquisition
        id: AcquisitionId,
        /// Remote status string that made it terminal
        status: String,
    },

    /// Copying a matched arrival into place failed
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// No matching arrival appeared before the deadline
    #[error("no arrival matched {filename} within {waited:?}")]
    TimeoutExpired {
        /// The expected filename
        filename: String,
        /// How long the entry was waited on
        waited: Duration,
    },

    /// Queue snapshot could not be read or written
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A request descriptor could not be read or parsed
    #[error("invalid descriptor {path}: {reason}")]
    InvalidDescriptor {
        /// Path of the descriptor file
        path: PathBuf,
        /// Why it could not be used
        reason: String,
    },

    /// Folder watching error
    #[error("folder watch error: {0}")]
    FolderWatch(String),

    /// Shutdown in progress - not accepting new descriptors
    #[error("shutdown in progress: not accepting new work")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Terminal failure of a file transfer after all attempts
#[derive(Debug, Error)]
#[error("failed to copy {source_path} to {dest_path} after {attempts} attempt(s): {reason}")]
pub struct TransferError {
    /// The arrival file being copied
    pub source_path: PathBuf,
    /// The final destination path
    pub dest_path: PathBuf,
    /// Number of attempts made
    pub attempts: u32,
    /// The last underlying failure
    pub reason: String,
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Machine-readable error code for structured log fields
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) | Error::Sqlx(_) => "database_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::Api { .. } => "api_error",
            Error::Submission { .. } => "submission_error",
            Error::AcquisitionUnavailable { .. } => "acquisition_unavailable",
            Error::Transfer(_) => "transfer_error",
            Error::TimeoutExpired { .. } => "timeout_expired",
            Error::Persistence(_) => "persistence_error",
            Error::InvalidDescriptor { .. } => "invalid_descriptor",
            Error::FolderWatch(_) => "folder_watch_error",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}
