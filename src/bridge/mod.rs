//! Service object tying the pipeline together.
//!
//! [`Bridge`] owns the shared state and its methods are split by concern:
//! - [`lifecycle`] - startup restore, task start and graceful shutdown
//! - [`services`] - background task starters (worker, snapshots, watcher)

mod lifecycle;
mod services;

use crate::acquisition::{AcquisitionClient, RealDebridClient};
use crate::catalog::{ArrReporter, FailureReporter};
use crate::config::Config;
use crate::db::Database;
use crate::destination::DestinationResolver;
use crate::error::Result;
use crate::intake::Intake;
use crate::placeholder::PlaceholderGuard;
use crate::queue::PendingQueue;
use crate::reconcile::Reconciler;
use crate::snapshot::SnapshotWriter;
use crate::transfer::TransferEngine;
use crate::types::{DeliveryOutcome, Event, HistoryEntry, QueueEntry};
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Running bridge instance
pub struct Bridge {
    /// Database, absent when it could not be opened or recovered
    pub db: Option<Arc<Database>>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) config: Arc<Config>,
    pub(crate) resolver: DestinationResolver,
    pub(crate) queue: Arc<PendingQueue>,
    pub(crate) placeholders: Arc<PlaceholderGuard>,
    /// Single path for every queue snapshot write
    pub(crate) snapshots: Arc<SnapshotWriter>,
    pub(crate) reconciler: Arc<Reconciler>,
    pub(crate) intake: Arc<Intake>,
    /// Stops the watcher, intake tasks and worker
    pub(crate) cancel: CancellationToken,
    /// Background tasks awaited on shutdown
    pub(crate) tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Bridge {
    /// Create a bridge talking to Real-Debrid and the configured catalogs
    ///
    /// The configuration is validated first. Nothing runs until
    /// [`start`](Self::start) is called.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let acquisition: Arc<dyn AcquisitionClient> =
            Arc::new(RealDebridClient::new(&config.acquisition)?);
        let reporter: Arc<dyn FailureReporter> = Arc::new(ArrReporter::new(
            config.catalogs.clone(),
            config.acquisition.request_timeout,
        )?);

        Self::with_services(config, acquisition, reporter).await
    }

    /// Create a bridge over explicit service implementations
    ///
    /// Prepares folders, opens the database and restores the pending queue
    /// from the last snapshot.
    pub async fn with_services(
        config: Config,
        acquisition: Arc<dyn AcquisitionClient>,
        reporter: Arc<dyn FailureReporter>,
    ) -> Result<Self> {
        let resolver = DestinationResolver::from_config(&config);
        resolver.ensure_folders().await?;

        let db = Self::open_database(&config).await;

        // Buffer size of 1000 events, same for every subscriber
        let (event_tx, _rx) = broadcast::channel(1000);

        let queue = Arc::new(PendingQueue::new());
        let placeholders = Arc::new(PlaceholderGuard::new());
        let snapshots = Arc::new(SnapshotWriter::new(Arc::clone(&queue), db.clone()));
        let cancel = CancellationToken::new();

        let transfer = TransferEngine::new(config.transfer.clone(), event_tx.clone());
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&queue),
            Arc::clone(&placeholders),
            transfer,
            Arc::clone(&reporter),
            db.clone(),
            Arc::clone(&snapshots),
            config.paths.arrival_root.clone(),
            config.reconcile.clone(),
            event_tx.clone(),
        ));

        let intake = Arc::new(Intake::new(
            acquisition,
            reporter,
            resolver.clone(),
            Arc::clone(&queue),
            Arc::clone(&placeholders),
            Arc::clone(&snapshots),
            config.intake.clone(),
            config.acquisition.poll_interval,
            event_tx.clone(),
            cancel.clone(),
        ));

        let bridge = Self {
            db,
            event_tx,
            config: Arc::new(config),
            resolver,
            queue,
            placeholders,
            snapshots,
            reconciler,
            intake,
            cancel,
            tasks: Mutex::new(Vec::new()),
        };

        bridge.restore_queue().await;

        Ok(bridge)
    }

    /// Subscribe to pipeline events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Entries still waiting for an arrival
    pub async fn pending(&self) -> Vec<QueueEntry> {
        self.queue.snapshot().await
    }

    /// Delivery history, newest first
    ///
    /// Empty when running without a database.
    pub async fn history(
        &self,
        outcome: Option<DeliveryOutcome>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<HistoryEntry>> {
        match &self.db {
            Some(db) => db.query_history(outcome, limit, offset).await,
            None => Ok(Vec::new()),
        }
    }

    /// Configuration the bridge was built with
    pub fn config(&self) -> &Config {
        &self.config
    }
}
