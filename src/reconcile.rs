//! Reconciliation worker
//!
//! The single consumer of the [`PendingQueue`]. Each cycle takes one entry,
//! looks for a file with the expected name anywhere in the arrival tree and
//! either delivers it, puts the entry back for a later cycle, or gives up once
//! the entry has been pending for longer than the match timeout.
//!
//! Cycles are serialized by an internal lock, so concurrent triggers (the
//! timer loop, an arrival event, a test calling [`Reconciler::run_cycle_at`])
//! never run two passes at once.

use crate::catalog::FailureReporter;
use crate::config::ReconcileConfig;
use crate::db::{Database, NewHistoryEntry};
use crate::error::Error;
use crate::placeholder::PlaceholderGuard;
use crate::queue::PendingQueue;
use crate::snapshot::SnapshotWriter;
use crate::transfer::TransferEngine;
use crate::types::{DeliveryOutcome, Event, QueueEntry};
use crate::utils::strip_extension;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, broadcast};
use tokio_util::sync::CancellationToken;

/// What one reconciliation cycle did
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The queue was empty
    Idle,
    /// The entry matched and was copied into place
    Delivered {
        /// Expected filename
        filename: String,
        /// Bytes copied
        bytes: u64,
    },
    /// No match yet; the entry went back to the tail
    Requeued {
        /// Expected filename
        filename: String,
    },
    /// A match was found but the copy failed; the entry went back
    TransferFailed {
        /// Expected filename
        filename: String,
    },
    /// The entry exceeded the match timeout and was reported as failed
    TimedOut {
        /// Expected filename
        filename: String,
    },
}

/// Shared handles the worker operates on
pub struct Reconciler {
    queue: Arc<PendingQueue>,
    placeholders: Arc<PlaceholderGuard>,
    transfer: TransferEngine,
    reporter: Arc<dyn FailureReporter>,
    db: Option<Arc<Database>>,
    snapshots: Arc<SnapshotWriter>,
    arrival_root: PathBuf,
    config: ReconcileConfig,
    event_tx: broadcast::Sender<Event>,
    cycle_lock: Mutex<()>,
    wake: Notify,
}

impl Reconciler {
    /// Create a worker over the given queue and arrival tree
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<PendingQueue>,
        placeholders: Arc<PlaceholderGuard>,
        transfer: TransferEngine,
        reporter: Arc<dyn FailureReporter>,
        db: Option<Arc<Database>>,
        snapshots: Arc<SnapshotWriter>,
        arrival_root: PathBuf,
        config: ReconcileConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            queue,
            placeholders,
            transfer,
            reporter,
            db,
            snapshots,
            arrival_root,
            config,
            event_tx,
            cycle_lock: Mutex::new(()),
            wake: Notify::new(),
        }
    }

    /// Cut the current idle wait short
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Run cycles until `cancel` fires
    ///
    /// Cancellation is observed between cycles; a transfer in progress is
    /// allowed to finish.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            arrival_root = %self.arrival_root.display(),
            idle_delay_secs = self.config.idle_delay.as_secs(),
            match_timeout_secs = self.config.match_timeout.as_secs(),
            "reconciliation worker started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.run_cycle().await {
                CycleOutcome::Idle => {}
                outcome => tracing::debug!(?outcome, "cycle finished"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.wake.notified() => {
                    tracing::debug!("woken by arrival event");
                }
                _ = tokio::time::sleep(self.config.idle_delay) => {}
            }
        }

        tracing::info!("reconciliation worker stopped");
    }

    /// Run one cycle at the current time
    pub async fn run_cycle(&self) -> CycleOutcome {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle as if the clock read `now`
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleOutcome {
        let _cycle = self.cycle_lock.lock().await;

        let Some(mut entry) = self.queue.take_one().await else {
            return CycleOutcome::Idle;
        };
        let first_seen = *entry.first_seen_at.get_or_insert(now);
        let filename = entry.expected_filename.clone();

        match find_arrival(&self.arrival_root, &filename).await {
            Some(source) => self.deliver(entry, &source, first_seen, now).await,
            None if self.expired(first_seen, now) => self.expire(entry, first_seen, now).await,
            None => {
                tracing::trace!(filename = %filename, "no arrival yet");
                self.queue.put_back(entry).await;
                CycleOutcome::Requeued { filename }
            }
        }
    }

    fn expired(&self, first_seen: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        // A clock step backwards counts as "no time elapsed"
        let elapsed = (now - first_seen).to_std().unwrap_or_default();
        elapsed >= self.config.match_timeout
    }

    async fn deliver(
        &self,
        entry: QueueEntry,
        source: &Path,
        first_seen: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        let filename = entry.expected_filename.clone();
        let dest = entry.destination_path();

        tracing::info!(
            filename = %filename,
            source = %source.display(),
            dest = %dest.display(),
            "arrival matched"
        );

        if let Err(e) = self.placeholders.delete(&dest).await {
            tracing::warn!(
                dest = %dest.display(),
                error = %e,
                "could not remove placeholder, real file will be replaced"
            );
        }

        match self.transfer.copy(source, &dest).await {
            Ok(bytes) => {
                if let Some(newer) = self.queue.complete(&filename).await {
                    self.reserve(&newer).await;
                }
                self.record_history(&entry, DeliveryOutcome::Delivered, bytes)
                    .await;
                self.persist().await;
                self.emit(Event::Delivered {
                    filename: filename.clone(),
                    destination: dest,
                    size_bytes: bytes,
                });
                CycleOutcome::Delivered { filename, bytes }
            }
            Err(e) => {
                tracing::error!(filename = %filename, error = %e, "transfer failed");
                self.emit(Event::TransferFailed {
                    filename: filename.clone(),
                    error: e.to_string(),
                });

                if let Err(e) = self.placeholders.create(&dest).await {
                    tracing::error!(
                        dest = %dest.display(),
                        error = %e,
                        "failed to re-create placeholder"
                    );
                }

                if self.expired(first_seen, now) {
                    return self.expire(entry, first_seen, now).await;
                }
                self.queue.put_back(entry).await;
                CycleOutcome::TransferFailed { filename }
            }
        }
    }

    async fn expire(
        &self,
        entry: QueueEntry,
        first_seen: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        let filename = entry.expected_filename.clone();
        let timeout = Error::TimeoutExpired {
            filename: filename.clone(),
            waited: (now - first_seen).to_std().unwrap_or_default(),
        };
        tracing::warn!(category = %entry.category, error = %timeout, "giving up on entry");

        let release_title = strip_extension(&filename);
        if let Err(e) = self
            .reporter
            .report_failed(release_title, entry.category)
            .await
        {
            tracing::error!(
                release_title = %release_title,
                category = %entry.category,
                error = %e,
                "failed to report release as failed"
            );
        }

        if let Err(e) = self.placeholders.delete(&entry.destination_path()).await {
            tracing::warn!(filename = %filename, error = %e, "failed to remove placeholder");
        }

        // A request parked during this cycle needs its own placeholder
        if let Some(newer) = self.queue.complete(&filename).await {
            self.reserve(&newer).await;
        }

        self.record_history(&entry, DeliveryOutcome::TimedOut, 0)
            .await;
        self.persist().await;
        self.emit(Event::TimedOut {
            filename: filename.clone(),
            category: entry.category,
        });
        CycleOutcome::TimedOut { filename }
    }

    async fn record_history(&self, entry: &QueueEntry, outcome: DeliveryOutcome, bytes: u64) {
        let Some(db) = &self.db else { return };
        let record = NewHistoryEntry {
            filename: entry.expected_filename.clone(),
            category: entry.category,
            destination: entry.destination_folder.clone(),
            outcome,
            size_bytes: bytes,
            completed_at: Utc::now().timestamp(),
        };
        if let Err(e) = db.insert_history(&record).await {
            tracing::warn!(filename = %entry.expected_filename, error = %e, "failed to record history");
        }
    }

    /// Lock a placeholder for an entry re-queued by `complete`
    async fn reserve(&self, entry: &QueueEntry) {
        let dest = entry.destination_path();
        tracing::info!(
            filename = %entry.expected_filename,
            dest = %dest.display(),
            "newer request re-queued after completion"
        );
        // An already delivered file at the same path is left in place
        if let Err(e) = self.placeholders.create(&dest).await {
            tracing::error!(dest = %dest.display(), error = %e, "failed to create placeholder");
        }
    }

    /// Write the current queue snapshot to the database
    pub async fn persist(&self) {
        self.snapshots.persist().await;
    }

    fn emit(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }
}

/// Find a file named `filename` (case-insensitive) anywhere under `root`
pub async fn find_arrival(root: &Path, filename: &str) -> Option<PathBuf> {
    let root = root.to_path_buf();
    let filename = filename.to_string();

    let result = tokio::task::spawn_blocking(move || {
        walkdir::WalkDir::new(&root)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable arrival entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .find(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.eq_ignore_ascii_case(&filename))
            })
            .map(|entry| entry.into_path())
    })
    .await;

    match result {
        Ok(found) => found,
        Err(e) => {
            tracing::error!(error = %e, "arrival scan task failed");
            None
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferConfig;
    use crate::types::Category;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tempfile::{TempDir, tempdir};

    #[derive(Default)]
    struct RecordingReporter {
        calls: StdMutex<Vec<(String, Category)>>,
    }

    #[async_trait]
    impl FailureReporter for RecordingReporter {
        async fn report_failed(&self, release_title: &str, category: Category) -> crate::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .push((release_title.to_string(), category));
            Ok(())
        }
    }

    struct Fixture {
        _dir: TempDir,
        arrivals: PathBuf,
        dest: PathBuf,
        queue: Arc<PendingQueue>,
        placeholders: Arc<PlaceholderGuard>,
        reporter: Arc<RecordingReporter>,
        reconciler: Reconciler,
    }

    fn fixture() -> Fixture {
        let dir = tempdir().unwrap();
        let arrivals = dir.path().join("sync");
        let dest = dir.path().join("dest").join("radarr");
        std::fs::create_dir_all(&arrivals).unwrap();

        let (tx, _rx) = broadcast::channel(64);
        let queue = Arc::new(PendingQueue::new());
        let placeholders = Arc::new(PlaceholderGuard::new());
        let reporter = Arc::new(RecordingReporter::default());
        let transfer = TransferEngine::new(
            TransferConfig {
                chunk_size: 8,
                max_attempts: 1,
                retry_delay: Duration::from_millis(1),
            },
            tx.clone(),
        );

        let reconciler = Reconciler::new(
            queue.clone(),
            placeholders.clone(),
            transfer,
            reporter.clone(),
            None,
            Arc::new(SnapshotWriter::new(queue.clone(), None)),
            arrivals.clone(),
            ReconcileConfig {
                idle_delay: Duration::from_millis(10),
                match_timeout: Duration::from_secs(3600),
                snapshot_interval: Duration::from_secs(60),
            },
            tx,
        );

        Fixture {
            _dir: dir,
            arrivals,
            dest,
            queue,
            placeholders,
            reporter,
            reconciler,
        }
    }

    #[tokio::test]
    async fn empty_queue_is_idle() {
        let f = fixture();
        assert_eq!(f.reconciler.run_cycle().await, CycleOutcome::Idle);
    }

    #[tokio::test]
    async fn match_is_case_insensitive_and_delivers() {
        let f = fixture();
        let entry = QueueEntry::new("Show.S01E01.mkv", &f.dest, Category::Sonarr);
        let dest_path = entry.destination_path();
        f.queue.enqueue(entry).await;
        f.placeholders.create(&dest_path).await.unwrap();

        std::fs::create_dir_all(f.arrivals.join("x")).unwrap();
        std::fs::write(f.arrivals.join("x").join("show.s01e01.MKV"), b"episode bytes").unwrap();

        let outcome = f.reconciler.run_cycle().await;

        assert_eq!(
            outcome,
            CycleOutcome::Delivered {
                filename: "show.s01e01.mkv".to_string(),
                bytes: 13
            }
        );
        assert_eq!(std::fs::read(&dest_path).unwrap(), b"episode bytes");
        assert!(!PlaceholderGuard::is_locked(&dest_path).unwrap());
        assert!(f.queue.is_empty().await);
    }

    #[tokio::test]
    async fn no_match_requeues_and_records_first_seen() {
        let f = fixture();
        f.queue
            .enqueue(QueueEntry::new("movie.mkv", &f.dest, Category::Radarr))
            .await;

        let t0 = Utc::now();
        let outcome = f.reconciler.run_cycle_at(t0).await;
        assert!(matches!(outcome, CycleOutcome::Requeued { .. }));

        let snapshot = f.queue.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(
            snapshot[0].first_seen_at.map(|t| t.timestamp_millis()),
            Some(t0.timestamp_millis())
        );
    }

    #[tokio::test]
    async fn timeout_reports_exactly_once() {
        let f = fixture();
        let entry = QueueEntry::new("movie.mkv", &f.dest, Category::Radarr);
        let dest_path = entry.destination_path();
        f.queue.enqueue(entry).await;
        f.placeholders.create(&dest_path).await.unwrap();

        let t0 = Utc::now();
        assert!(matches!(
            f.reconciler.run_cycle_at(t0).await,
            CycleOutcome::Requeued { .. }
        ));
        assert!(matches!(
            f.reconciler
                .run_cycle_at(t0 + chrono::Duration::seconds(3599))
                .await,
            CycleOutcome::Requeued { .. }
        ));
        assert!(matches!(
            f.reconciler
                .run_cycle_at(t0 + chrono::Duration::seconds(3600))
                .await,
            CycleOutcome::TimedOut { .. }
        ));
        assert_eq!(
            f.reconciler
                .run_cycle_at(t0 + chrono::Duration::seconds(3700))
                .await,
            CycleOutcome::Idle
        );

        let calls = f.reporter.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("movie".to_string(), Category::Radarr)]);
        assert!(f.queue.is_empty().await);
        assert!(!dest_path.exists());
    }

    /// Arrival for `movie.mkv` whose copy always fails: a directory sits
    /// where the transfer wants its partial file
    fn failing_arrival(f: &Fixture) -> PathBuf {
        let entry = QueueEntry::new("movie.mkv", &f.dest, Category::Radarr);
        let dest_path = entry.destination_path();
        std::fs::create_dir_all(crate::transfer::partial_path(&dest_path)).unwrap();
        std::fs::write(f.arrivals.join("movie.mkv"), b"bytes").unwrap();
        dest_path
    }

    #[tokio::test]
    async fn transfer_failure_requeues_with_placeholder() {
        let f = fixture();
        let dest_path = failing_arrival(&f);
        f.queue
            .enqueue(QueueEntry::new("movie.mkv", &f.dest, Category::Radarr))
            .await;
        f.placeholders.create(&dest_path).await.unwrap();

        let outcome = f.reconciler.run_cycle().await;

        assert_eq!(
            outcome,
            CycleOutcome::TransferFailed {
                filename: "movie.mkv".to_string()
            }
        );
        assert_eq!(f.queue.len().await, 1);
        assert_eq!(std::fs::metadata(&dest_path).unwrap().len(), 0);
        assert!(f.placeholders.holds(&dest_path).await);
        assert!(PlaceholderGuard::is_locked(&dest_path).unwrap());
        assert!(f.reporter.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transfer_failing_past_deadline_times_out_once() {
        let f = fixture();
        let dest_path = failing_arrival(&f);
        f.queue
            .enqueue(QueueEntry::new("movie.mkv", &f.dest, Category::Radarr))
            .await;
        f.placeholders.create(&dest_path).await.unwrap();

        let t0 = Utc::now();
        assert!(matches!(
            f.reconciler.run_cycle_at(t0).await,
            CycleOutcome::TransferFailed { .. }
        ));
        assert_eq!(
            f.reconciler
                .run_cycle_at(t0 + chrono::Duration::seconds(3600))
                .await,
            CycleOutcome::TimedOut {
                filename: "movie.mkv".to_string()
            }
        );
        assert_eq!(
            f.reconciler
                .run_cycle_at(t0 + chrono::Duration::seconds(3700))
                .await,
            CycleOutcome::Idle
        );

        let calls = f.reporter.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![("movie".to_string(), Category::Radarr)]);
        assert!(f.queue.is_empty().await);
        assert!(!f.placeholders.holds(&dest_path).await);
        assert!(!dest_path.exists());
    }

    /// Reporter that enqueues a newer request while the entry is checked out
    struct RequeueOnReport {
        queue: Arc<PendingQueue>,
        newer: QueueEntry,
    }

    #[async_trait]
    impl FailureReporter for RequeueOnReport {
        async fn report_failed(&self, _release_title: &str, _category: Category) -> crate::Result<()> {
            self.queue.enqueue(self.newer.clone()).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn request_parked_during_timeout_keeps_a_placeholder() {
        let f = fixture();
        let entry = QueueEntry::new("movie.mkv", &f.dest, Category::Radarr);
        let dest_path = entry.destination_path();
        f.queue.enqueue(entry).await;
        f.placeholders.create(&dest_path).await.unwrap();

        let (tx, _rx) = broadcast::channel(16);
        let reconciler = Reconciler::new(
            f.queue.clone(),
            f.placeholders.clone(),
            TransferEngine::new(TransferConfig::default(), tx.clone()),
            Arc::new(RequeueOnReport {
                queue: f.queue.clone(),
                newer: QueueEntry::new("movie.mkv", &f.dest, Category::Radarr),
            }),
            None,
            Arc::new(SnapshotWriter::new(f.queue.clone(), None)),
            f.arrivals.clone(),
            ReconcileConfig {
                idle_delay: Duration::from_millis(10),
                match_timeout: Duration::ZERO,
                snapshot_interval: Duration::from_secs(60),
            },
            tx,
        );

        assert!(matches!(
            reconciler.run_cycle().await,
            CycleOutcome::TimedOut { .. }
        ));

        let pending = f.queue.snapshot().await;
        assert_eq!(pending.len(), 1);
        assert!(pending[0].first_seen_at.is_none());
        assert!(f.placeholders.holds(&dest_path).await);
        assert!(PlaceholderGuard::is_locked(&dest_path).unwrap());
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let f = fixture();
        let cancel = CancellationToken::new();
        let reconciler = Arc::new(f.reconciler);

        let handle = tokio::spawn({
            let reconciler = reconciler.clone();
            let cancel = cancel.clone();
            async move { reconciler.run(cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn find_arrival_walks_subdirectories() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("Movie.MKV"), b"x").unwrap();

        let found = find_arrival(dir.path(), "movie.mkv").await.unwrap();
        assert_eq!(found, nested.join("Movie.MKV"));
        assert!(find_arrival(dir.path(), "other.mkv").await.is_none());
    }
}
