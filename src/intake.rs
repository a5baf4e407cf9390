//! Descriptor intake
//!
//! Turns one request descriptor into pending queue entries:
//!
//! 1. resolve the category and delivery folder from the descriptor's location
//! 2. read the link
//! 3. submit it, wait for the file list while the service is still
//!    converting the link, and select the media members
//! 4. poll until the acquisition is ready, unavailable or in error
//! 5. lock a placeholder for each media member and enqueue it
//! 6. delete the descriptor
//!
//! Each descriptor runs on its own task so a slow acquisition never holds up
//! the others.

use crate::acquisition::AcquisitionClient;
use crate::catalog::FailureReporter;
use crate::config::IntakeConfig;
use crate::descriptor::{self, is_descriptor, release_title};
use crate::destination::DestinationResolver;
use crate::error::Error;
use crate::placeholder::PlaceholderGuard;
use crate::queue::PendingQueue;
use crate::snapshot::SnapshotWriter;
use crate::types::{AcquisitionId, AcquisitionInfo, AcquisitionStatus, Category, Event, QueueEntry};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How a descriptor was handled
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// Not under an enabled category folder, or not a descriptor
    Ignored,
    /// Could not be read or held no valid link; the file is kept
    Invalid,
    /// The acquisition service refused or could not be reached; the file is kept
    Rejected,
    /// The acquisition can never complete; reported upstream, file deleted
    Failed,
    /// Media members were queued; file deleted
    Enqueued {
        /// Number of queue entries created
        count: usize,
    },
    /// Shutdown interrupted polling; the file is kept for the next start
    Abandoned,
}

/// Everything a descriptor task needs
pub struct Intake {
    acquisition: Arc<dyn AcquisitionClient>,
    reporter: Arc<dyn FailureReporter>,
    resolver: DestinationResolver,
    queue: Arc<PendingQueue>,
    placeholders: Arc<PlaceholderGuard>,
    snapshots: Arc<SnapshotWriter>,
    config: IntakeConfig,
    poll_interval: Duration,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
    in_flight: Mutex<HashSet<PathBuf>>,
    idle: Notify,
}

impl Intake {
    /// Create the intake pipeline
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        acquisition: Arc<dyn AcquisitionClient>,
        reporter: Arc<dyn FailureReporter>,
        resolver: DestinationResolver,
        queue: Arc<PendingQueue>,
        placeholders: Arc<PlaceholderGuard>,
        snapshots: Arc<SnapshotWriter>,
        config: IntakeConfig,
        poll_interval: Duration,
        event_tx: broadcast::Sender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            acquisition,
            reporter,
            resolver,
            queue,
            placeholders,
            snapshots,
            config,
            poll_interval,
            event_tx,
            cancel,
            in_flight: Mutex::new(HashSet::new()),
            idle: Notify::new(),
        }
    }

    /// Start handling `path` on its own task
    ///
    /// Returns `None` if the path is not a descriptor, is already being
    /// handled, or shutdown has begun.
    pub async fn dispatch(self: &Arc<Self>, path: PathBuf) -> Option<JoinHandle<IntakeOutcome>> {
        if !is_descriptor(&path) || self.cancel.is_cancelled() {
            return None;
        }
        if !self.in_flight.lock().await.insert(path.clone()) {
            tracing::debug!(path = %path.display(), "descriptor already in flight");
            return None;
        }

        let intake = Arc::clone(self);
        Some(tokio::spawn(async move {
            // Let the producer finish writing the file
            let outcome = tokio::select! {
                _ = intake.cancel.cancelled() => IntakeOutcome::Abandoned,
                _ = tokio::time::sleep(intake.config.settle_delay) => {
                    intake.handle_descriptor(&path).await
                }
            };
            tracing::debug!(path = %path.display(), ?outcome, "descriptor handled");

            let mut in_flight = intake.in_flight.lock().await;
            in_flight.remove(&path);
            if in_flight.is_empty() {
                intake.idle.notify_waiters();
            }
            outcome
        }))
    }

    /// Wait until no descriptor task is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a task finishing in between is seen
            notified.as_mut().enable();

            if self.in_flight.lock().await.is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Dispatch every descriptor already present in the monitored folders
    pub async fn scan_existing(self: &Arc<Self>) -> Vec<JoinHandle<IntakeOutcome>> {
        let folders = self.resolver.monitored_folders();
        let found = tokio::task::spawn_blocking(move || {
            folders
                .iter()
                .flat_map(|folder| {
                    walkdir::WalkDir::new(folder)
                        .into_iter()
                        .filter_map(|e| e.ok())
                        .filter(|e| e.file_type().is_file())
                        .map(|e| e.into_path())
                        .collect::<Vec<_>>()
                })
                .filter(|p| is_descriptor(p))
                .collect::<Vec<_>>()
        })
        .await
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "descriptor scan task failed");
            Vec::new()
        });

        if !found.is_empty() {
            tracing::info!(count = found.len(), "processing descriptors found at startup");
        }

        let mut handles = Vec::new();
        for path in found {
            if let Some(handle) = self.dispatch(path).await {
                handles.push(handle);
            }
        }
        handles
    }

    /// Handle one descriptor to completion
    pub async fn handle_descriptor(&self, path: &Path) -> IntakeOutcome {
        let Some((category, destination)) = self.resolver.resolve(path) else {
            tracing::debug!(path = %path.display(), "descriptor outside enabled category folders");
            return IntakeOutcome::Ignored;
        };

        let link = match descriptor::read_link(path).await {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(error = %e, "keeping unusable descriptor");
                return IntakeOutcome::Invalid;
            }
        };

        let title = release_title(path);
        tracing::info!(release_title = %title, category = %category, "processing descriptor");

        let id = match self.acquisition.submit(&link).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(
                    release_title = %title,
                    category = %category,
                    error = %e,
                    "submission failed, keeping descriptor"
                );
                return IntakeOutcome::Rejected;
            }
        };

        let info = match self.wait_for_file_list(&id, &title).await {
            Ok(info) => info,
            Err(outcome) => return outcome,
        };

        let members = info.media_members;
        if members.is_empty() {
            let status = match info.status {
                AcquisitionStatus::Ready => "no media files".to_string(),
                _ => info.raw_status,
            };
            let reason = Error::AcquisitionUnavailable {
                id: id.clone(),
                status,
            };
            return self.fail(path, &title, category, &id, reason).await;
        }

        let file_ids: Vec<u64> = members.iter().map(|m| m.id).collect();
        if let Err(e) = self.acquisition.select_files(&id, &file_ids).await {
            tracing::error!(acquisition_id = %id, error = %e, "failed to select files");
            self.cancel_quietly(&id).await;
            return IntakeOutcome::Rejected;
        }

        loop {
            let info = match self.acquisition.poll(&id).await {
                Ok(info) => info,
                Err(e) => {
                    tracing::error!(acquisition_id = %id, error = %e, "failed to poll acquisition");
                    self.cancel_quietly(&id).await;
                    return IntakeOutcome::Rejected;
                }
            };

            match info.status {
                AcquisitionStatus::Ready => break,
                AcquisitionStatus::Unavailable | AcquisitionStatus::Error => {
                    let reason = Error::AcquisitionUnavailable {
                        id: id.clone(),
                        status: info.raw_status,
                    };
                    return self.fail(path, &title, category, &id, reason).await;
                }
                AcquisitionStatus::Pending => {
                    tracing::debug!(
                        acquisition_id = %id,
                        raw_status = %info.raw_status,
                        "acquisition still in progress"
                    );
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(release_title = %title, "shutdown while polling, keeping descriptor");
                    return IntakeOutcome::Abandoned;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }

        for member in &members {
            let entry = QueueEntry::new(&member.name, &destination, category);
            let dest_path = entry.destination_path();
            let filename = entry.expected_filename.clone();

            // The worker may deliver as soon as the entry is queued
            if let Err(e) = self.placeholders.create(&dest_path).await {
                tracing::error!(path = %dest_path.display(), error = %e, "failed to create placeholder");
            }
            self.queue.enqueue(entry).await;
            tracing::info!(filename = %filename, category = %category, "enqueued");
            let _ = self.event_tx.send(Event::Enqueued { filename, category });
        }

        self.snapshots.persist().await;
        self.delete_descriptor(path).await;

        IntakeOutcome::Enqueued {
            count: members.len(),
        }
    }

    /// Poll until the acquisition lists its files
    ///
    /// Right after submission a magnet is still being converted and the
    /// service reports a pending status with no files; that is not a failure.
    async fn wait_for_file_list(
        &self,
        id: &AcquisitionId,
        title: &str,
    ) -> std::result::Result<AcquisitionInfo, IntakeOutcome> {
        loop {
            let info = match self.acquisition.poll(id).await {
                Ok(info) => info,
                Err(e) => {
                    tracing::error!(acquisition_id = %id, error = %e, "failed to read acquisition");
                    self.cancel_quietly(id).await;
                    return Err(IntakeOutcome::Rejected);
                }
            };

            if !info.media_members.is_empty() || info.status != AcquisitionStatus::Pending {
                return Ok(info);
            }
            tracing::debug!(
                acquisition_id = %id,
                raw_status = %info.raw_status,
                "file list not available yet"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!(release_title = %title, "shutdown while waiting for files, keeping descriptor");
                    return Err(IntakeOutcome::Abandoned);
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn fail(
        &self,
        path: &Path,
        title: &str,
        category: Category,
        id: &AcquisitionId,
        reason: Error,
    ) -> IntakeOutcome {
        tracing::warn!(release_title = %title, category = %category, error = %reason, "acquisition failed");

        self.cancel_quietly(id).await;

        if let Err(e) = self.reporter.report_failed(title, category).await {
            tracing::error!(
                release_title = %title,
                category = %category,
                error = %e,
                "failed to report release as failed"
            );
        }

        let _ = self.event_tx.send(Event::AcquisitionFailed {
            release_title: title.to_string(),
            category,
            error: reason.to_string(),
        });

        self.delete_descriptor(path).await;
        IntakeOutcome::Failed
    }

    async fn cancel_quietly(&self, id: &AcquisitionId) {
        if let Err(e) = self.acquisition.cancel(id).await {
            tracing::warn!(acquisition_id = %id, error = %e, "failed to cancel acquisition");
        }
    }

    async fn delete_descriptor(&self, path: &Path) {
        if let Err(e) =
            descriptor::delete_descriptor(path, self.config.delete_attempts, self.config.delete_delay)
                .await
        {
            tracing::error!(path = %path.display(), error = %e, "failed to delete descriptor");
        }
    }
}
