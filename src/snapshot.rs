//! Queue snapshot writer
//!
//! Intake, the reconciliation worker, the periodic snapshot task and shutdown
//! all persist the pending queue. Reading the queue and saving it happen under
//! one lock, so a snapshot taken earlier can never be committed over a newer
//! one.

use crate::db::Database;
use crate::queue::PendingQueue;
use crate::Result;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Serializes queue snapshots into the database
pub struct SnapshotWriter {
    queue: Arc<PendingQueue>,
    db: Option<Arc<Database>>,
    write_lock: Mutex<()>,
}

impl SnapshotWriter {
    /// Create a writer; without a database every save is a no-op
    pub fn new(queue: Arc<PendingQueue>, db: Option<Arc<Database>>) -> Self {
        Self {
            queue,
            db,
            write_lock: Mutex::new(()),
        }
    }

    /// Whether snapshots go anywhere
    pub fn is_enabled(&self) -> bool {
        self.db.is_some()
    }

    /// Snapshot the queue and replace the stored copy, returning the entry count
    pub async fn save(&self) -> Result<usize> {
        let Some(db) = &self.db else { return Ok(0) };

        let _write = self.write_lock.lock().await;
        let entries = self.queue.snapshot().await;
        db.save_pending(&entries).await?;
        Ok(entries.len())
    }

    /// Like [`save`](Self::save), logging a failure instead of returning it
    pub async fn persist(&self) {
        if let Err(e) = self.save().await {
            tracing::error!(error = %e, "failed to persist queue snapshot");
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, QueueEntry};
    use tempfile::tempdir;

    #[tokio::test]
    async fn without_database_saves_nothing() {
        let writer = SnapshotWriter::new(Arc::new(PendingQueue::new()), None);
        assert!(!writer.is_enabled());
        assert_eq!(writer.save().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_writers_never_lose_entries() {
        for trial in 0..10 {
            let dir = tempdir().unwrap();
            let db = Arc::new(Database::new(&dir.path().join("snap.db")).await.unwrap());
            let queue = Arc::new(PendingQueue::new());
            let writer = Arc::new(SnapshotWriter::new(queue.clone(), Some(db.clone())));

            let background = tokio::spawn({
                let writer = writer.clone();
                async move {
                    for _ in 0..40 {
                        writer.save().await.unwrap();
                        tokio::task::yield_now().await;
                    }
                }
            });

            for i in 0..20 {
                queue
                    .enqueue(QueueEntry::new(format!("f{i}.mkv"), "/dest/radarr", Category::Radarr))
                    .await;
                writer.save().await.unwrap();
                tokio::task::yield_now().await;
            }
            background.await.unwrap();

            let stored = db.load_pending().await.unwrap();
            assert_eq!(stored.len(), queue.len().await, "trial {trial} lost entries");
        }
    }
}
