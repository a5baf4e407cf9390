//! Background service starters: reconciliation worker, periodic queue
//! snapshots and the folder watcher.

use crate::error::Result;
use crate::folder_watcher::FolderWatcher;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::Bridge;

impl Bridge {
    /// Start the reconciliation worker
    pub(crate) fn start_reconciler(&self) -> JoinHandle<()> {
        let reconciler = Arc::clone(&self.reconciler);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            reconciler.run(cancel).await;
        })
    }

    /// Start the task that snapshots the queue at a fixed interval
    ///
    /// Intake and the worker already persist after each change; this catches
    /// anything in between (e.g. first-seen timestamps).
    pub(crate) fn start_snapshot_task(&self) -> JoinHandle<()> {
        let snapshots = Arc::clone(&self.snapshots);
        let cancel = self.cancel.clone();
        let interval = self.config.reconcile.snapshot_interval;

        if !snapshots.is_enabled() {
            tracing::info!("No database, skipping periodic snapshots");
            return tokio::spawn(async {});
        }

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => snapshots.persist().await,
                }
            }
            tracing::debug!("snapshot task stopped");
        })
    }

    /// Start the folder watcher background task
    pub(crate) fn start_folder_watcher(&self) -> Result<JoinHandle<()>> {
        let arrival_root = self
            .config
            .paths
            .watch_arrivals
            .then(|| self.config.paths.arrival_root.clone());

        let mut watcher = FolderWatcher::new(self.resolver.monitored_folders(), arrival_root)?;
        watcher.start()?;

        let intake = Arc::clone(&self.intake);
        let reconciler = Arc::clone(&self.reconciler);
        let cancel = self.cancel.clone();

        let handle = tokio::spawn(async move {
            watcher.run(intake, reconciler, cancel).await;
        });

        tracing::info!("Folder watcher background task started");

        Ok(handle)
    }
}
