//! Startup and shutdown coordination.

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::types::Event;
use std::sync::Arc;
use std::time::Duration;

use super::Bridge;

/// How long shutdown waits for background tasks
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl Bridge {
    /// Open the database, falling back to running without one
    pub(crate) async fn open_database(config: &Config) -> Option<Arc<Database>> {
        let Some(db) = Database::open_or_recover(&config.persistence.database_path).await else {
            tracing::error!(
                path = %config.persistence.database_path.display(),
                "running without persistence, queue will not survive a restart"
            );
            return None;
        };

        match db.was_unclean_shutdown().await {
            Ok(true) => tracing::warn!(
                "previous run did not shut down cleanly, restoring from last snapshot"
            ),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "could not read shutdown marker"),
        }

        // Mark that we're running (for unclean shutdown detection)
        if let Err(e) = db.set_clean_start().await {
            tracing::error!(error = %e, "failed to set startup marker");
        }

        Some(Arc::new(db))
    }

    /// Load the last snapshot into the queue and lock its placeholders again
    pub(crate) async fn restore_queue(&self) {
        let Some(db) = &self.db else { return };

        let entries = match db.load_pending().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(error = %e, "failed to load queue snapshot, starting empty");
                return;
            }
        };
        if entries.is_empty() {
            return;
        }

        let restored = self.queue.restore(entries).await;
        tracing::info!(count = restored, "restored pending entries from snapshot");

        for entry in self.queue.snapshot().await {
            let path = entry.destination_path();
            if let Err(e) = self.placeholders.create(&path).await {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to re-lock placeholder"
                );
            }
        }
    }

    /// Write the queue snapshot one last time, returning the entry count
    async fn persist_final(&self) -> Result<usize> {
        self.snapshots
            .save()
            .await
            .map_err(|e| Error::Persistence(format!("final snapshot: {}", e)))
    }

    /// Start all background tasks and process descriptors already on disk
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown) has
    /// begun, or an error if the folder watcher cannot be set up.
    pub async fn start(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::ShuttingDown);
        }

        let watcher = self.start_folder_watcher()?;
        let worker = self.start_reconciler();
        let snapshots = self.start_snapshot_task();

        self.tasks.lock().await.extend([watcher, worker, snapshots]);

        let startup = self.intake.scan_existing().await;
        tracing::info!(
            descriptors = startup.len(),
            pending = self.queue.len().await,
            "bridge started"
        );

        Ok(())
    }

    /// Gracefully shut down the bridge
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Cancels the watcher, intake tasks and worker
    /// 2. Waits for background and descriptor tasks with a timeout (30
    ///    seconds); a transfer in progress is allowed to finish
    /// 3. Persists the final queue snapshot
    /// 4. Releases placeholder locks (the files stay for the next run)
    /// 5. Marks a clean shutdown in the database
    ///
    /// # Errors
    ///
    /// Returns an error only if the clean-shutdown marker cannot be written.
    /// Every other step is attempted regardless of earlier failures.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop everything at its next cancellation point
        self.cancel.cancel();

        // 2. Wait for the tasks to wind down
        let tasks: Vec<_> = self.tasks.lock().await.drain(..).collect();
        let wait = async {
            for task in tasks {
                if let Err(e) = task.await {
                    tracing::warn!(error = %e, "background task ended abnormally");
                }
            }
            self.intake.wait_idle().await;
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait).await.is_err() {
            tracing::warn!("Timeout waiting for background tasks, proceeding with shutdown");
        }

        // 3. Persist final state
        match self.persist_final().await {
            Ok(pending) => tracing::info!(pending, "Final queue snapshot persisted"),
            Err(e) => tracing::error!(
                error = %e,
                error_code = e.error_code(),
                "Failed to persist final state during shutdown"
            ),
        }

        // 4. Drop placeholder locks
        let released = self.placeholders.release_all().await;
        tracing::debug!(released, "placeholder locks released");

        // 5. Mark clean shutdown in database
        if let Some(db) = &self.db {
            db.set_clean_shutdown().await?;
            tracing::info!("Marked clean shutdown in database");
        }

        // 6. Emit shutdown event
        let _ = self.event_tx.send(Event::Shutdown);

        tracing::info!("Shutdown complete");
        Ok(())
    }
}
