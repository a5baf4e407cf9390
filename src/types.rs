//! Core types for debridarr

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Remote handle of an acquisition (Real-Debrid torrent id)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AcquisitionId(pub String);

impl AcquisitionId {
    /// Create a new AcquisitionId
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw remote id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AcquisitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Originating category of a request; selects both the destination root and
/// the upstream catalog that gets told about failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// TV series, handled by Sonarr
    Sonarr,
    /// Movies, handled by Radarr
    Radarr,
}

impl Category {
    /// All categories, in resolution order
    pub const ALL: [Category; 2] = [Category::Sonarr, Category::Radarr];

    /// Folder / catalog name of this category
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Sonarr => "sonarr",
            Category::Radarr => "radarr",
        }
    }

    /// Parse a category name (case-insensitive)
    pub fn parse(value: &str) -> Option<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(value))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outstanding "expected filename → destination" request
///
/// `expected_filename` is stored lowercased and is the dedup key of the
/// pending match queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Lowercased base name of the file expected in the arrival tree
    pub expected_filename: String,
    /// Folder the matched file is delivered into
    pub destination_folder: PathBuf,
    /// Category the request came from
    pub category: Category,
    /// When the entry was (last) enqueued
    pub enqueued_at: DateTime<Utc>,
    /// When the worker first attempted this entry; the match deadline runs from here
    pub first_seen_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Create a fresh entry; the filename is normalized to lowercase
    pub fn new(
        expected_filename: impl AsRef<str>,
        destination_folder: impl Into<PathBuf>,
        category: Category,
    ) -> Self {
        Self {
            expected_filename: normalize_filename(expected_filename.as_ref()),
            destination_folder: destination_folder.into(),
            category,
            enqueued_at: Utc::now(),
            first_seen_at: None,
        }
    }

    /// Final path of the delivered file (and of its placeholder)
    pub fn destination_path(&self) -> PathBuf {
        self.destination_folder.join(&self.expected_filename)
    }
}

/// Normalize a filename into the queue's dedup key form
pub fn normalize_filename(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Status of an acquisition as reported by the remote service
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionStatus {
    /// Still being prepared remotely
    Pending,
    /// Cached/downloaded remotely; media members will appear in the arrival tree
    Ready,
    /// The service cannot fulfill the request (e.g. not cached)
    Unavailable,
    /// The service failed the request
    Error,
}

impl AcquisitionStatus {
    /// Whether the status ends the polling loop
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AcquisitionStatus::Pending)
    }
}

/// A media file inside an acquisition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaMember {
    /// Remote file id (used for file selection)
    pub id: u64,
    /// Lowercased base name the file will have in the arrival tree
    pub name: String,
}

/// Result of polling an acquisition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionInfo {
    /// Remote handle
    pub id: AcquisitionId,
    /// Normalized status
    pub status: AcquisitionStatus,
    /// Raw remote status string, kept for logs
    pub raw_status: String,
    /// Media files of the item (samples and non-media excluded)
    pub media_members: Vec<MediaMember>,
}

/// How a queue entry left the queue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Matched and copied into place
    Delivered,
    /// No arrival before the deadline; reported upstream
    TimedOut,
}

impl DeliveryOutcome {
    /// Convert to the integer code stored in the database
    pub fn to_i32(&self) -> i32 {
        match self {
            DeliveryOutcome::Delivered => 0,
            DeliveryOutcome::TimedOut => 1,
        }
    }

    /// Convert an integer code from the database
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => DeliveryOutcome::Delivered,
            _ => DeliveryOutcome::TimedOut,
        }
    }
}

/// Historical record of an entry that left the queue
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Database id
    pub id: i64,
    /// Expected filename of the entry
    pub filename: String,
    /// Originating category
    pub category: Category,
    /// Destination folder
    pub destination: PathBuf,
    /// How it ended
    pub outcome: DeliveryOutcome,
    /// Bytes copied (0 for timeouts)
    pub size_bytes: u64,
    /// When it ended
    pub completed_at: DateTime<Utc>,
}

/// Events emitted by the bridge
///
/// Subscribers receive these via [`crate::Bridge::subscribe`]. Transfer progress
/// events are the observer hook of the transfer engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A media member was added to the pending match queue
    Enqueued {
        /// Expected filename
        filename: String,
        /// Category of the request
        category: Category,
    },

    /// A match was found and the copy started
    TransferStarted {
        /// Expected filename
        filename: String,
        /// Arrival file being copied
        source: PathBuf,
        /// Source size in bytes
        total_bytes: u64,
    },

    /// Copy progress (emitted once per chunk)
    TransferProgress {
        /// Expected filename
        filename: String,
        /// Bytes written so far in this attempt
        bytes_transferred: u64,
        /// Source size in bytes
        total_bytes: u64,
    },

    /// File delivered to its destination
    Delivered {
        /// Expected filename
        filename: String,
        /// Final path
        destination: PathBuf,
        /// Bytes copied
        size_bytes: u64,
    },

    /// A transfer failed after all attempts; the entry stays queued
    TransferFailed {
        /// Expected filename
        filename: String,
        /// Error message
        error: String,
    },

    /// No arrival within the deadline; failure reported upstream
    TimedOut {
        /// Expected filename
        filename: String,
        /// Category of the request
        category: Category,
    },

    /// The acquisition service could not fulfill a descriptor
    AcquisitionFailed {
        /// Release title (descriptor stem)
        release_title: String,
        /// Category of the request
        category: Category,
        /// Error message
        error: String,
    },

    /// The bridge is shutting down
    Shutdown,
}
