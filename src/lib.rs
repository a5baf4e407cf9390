//! # debridarr
//!
//! Bridges remote torrent acquisition (Real-Debrid) and a locally synced
//! arrival folder into the download folders Sonarr and Radarr watch.
//!
//! ## How it works
//!
//! - A catalog drops a `.magnet` or `.torrent` descriptor into its category
//!   folder.
//! - The descriptor is submitted to Real-Debrid and polled until the
//!   acquisition is ready; its media files become pending queue entries, each
//!   with a locked zero-byte placeholder at its destination.
//! - Real-Debrid content shows up in the arrival tree via an external sync
//!   (rclone). A single reconciliation worker matches arrivals to entries by
//!   case-insensitive filename, removes the placeholder and copies the file
//!   into place.
//! - Entries that never arrive within the match timeout are reported to the
//!   catalog as failed so it searches for a replacement.
//!
//! ## Quick Start
//!
//! ```no_run
//! use debridarr::{Bridge, Config, run_with_shutdown};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let bridge = Bridge::new(config).await?;
//!
//!     let mut events = bridge.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     bridge.start().await?;
//!     run_with_shutdown(bridge).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Acquisition service client
pub mod acquisition;
/// Service wiring, startup and shutdown
pub mod bridge;
/// Upstream catalog failure reporting
pub mod catalog;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Request descriptor reading
pub mod descriptor;
/// Category and delivery folder resolution
pub mod destination;
/// Error types
pub mod error;
/// Folder watching for descriptors and arrivals
pub mod folder_watcher;
/// Descriptor intake pipeline
pub mod intake;
/// Zero-byte locked placeholders
pub mod placeholder;
/// Pending match queue
pub mod queue;
/// Reconciliation worker
pub mod reconcile;
/// Retry logic with exponential backoff
pub mod retry;
/// Serialized queue snapshots
pub mod snapshot;
/// Chunked file transfer with retry
pub mod transfer;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use acquisition::{AcquisitionClient, RealDebridClient};
pub use bridge::Bridge;
pub use catalog::{ArrReporter, FailureReporter};
pub use config::Config;
pub use db::Database;
pub use error::{DatabaseError, Error, Result, TransferError};
pub use types::{
    AcquisitionId, AcquisitionInfo, AcquisitionStatus, Category, DeliveryOutcome, Event,
    HistoryEntry, MediaMember, QueueEntry,
};

/// Helper function to run the bridge with graceful signal handling.
///
/// Waits for a termination signal and then calls the bridge's `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(bridge: Bridge) -> Result<()> {
    wait_for_signal().await;
    bridge.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
