//! Filesystem event source
//!
//! Watches the per-category descriptor folders (recursively) and, when
//! enabled, the arrival tree. Raw `notify` events are classified into
//! [`WatchEvent`]s:
//! - a descriptor appearing under a descriptor folder starts an intake task
//! - any file appearing in the arrival tree wakes the reconciliation worker
//!
//! Only create and modify events count; everything else is ignored. The
//! arrival event is only a hint. The worker's idle timer still polls the tree,
//! since network mounts often emit no events at all.

use crate::descriptor::is_descriptor;
use crate::error::{Error, Result};
use crate::intake::Intake;
use crate::reconcile::Reconciler;
use notify::{
    Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A filesystem event the pipeline cares about
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchEvent {
    /// A descriptor file was created or written
    DescriptorCreated(PathBuf),
    /// A file was created or written somewhere in the arrival tree
    ArrivalCreated(PathBuf),
}

/// Watches descriptor folders and the arrival tree
pub struct FolderWatcher {
    /// Filesystem watcher instance
    watcher: RecommendedWatcher,

    /// Channel for receiving filesystem events
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,

    /// Descriptor folders of the enabled categories
    descriptor_folders: Vec<PathBuf>,

    /// Arrival tree root, if arrival events are wanted
    arrival_root: Option<PathBuf>,
}

impl FolderWatcher {
    /// Create a watcher; nothing is watched until [`start`](Self::start)
    ///
    /// # Errors
    /// Returns error if the filesystem watcher cannot be initialized
    pub fn new(descriptor_folders: Vec<PathBuf>, arrival_root: Option<PathBuf>) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                if let Err(e) = tx.send(res) {
                    error!("Failed to send filesystem event: {}", e);
                }
            },
            NotifyConfig::default(),
        )
        .map_err(|e| Error::FolderWatch(e.to_string()))?;

        Ok(Self {
            watcher,
            rx,
            descriptor_folders,
            arrival_root,
        })
    }

    /// Register all folders with the filesystem watcher
    ///
    /// Descriptor folders are created if missing. An arrival root that cannot
    /// be watched is logged and skipped; the worker falls back to polling.
    ///
    /// # Errors
    /// Returns error if a descriptor folder cannot be created or watched
    pub fn start(&mut self) -> Result<()> {
        for folder in &self.descriptor_folders {
            if !folder.exists() {
                std::fs::create_dir_all(folder).map_err(|e| {
                    Error::FolderWatch(format!("Failed to create descriptor folder: {}", e))
                })?;
                info!(folder = %folder.display(), "created descriptor folder");
            }

            self.watcher
                .watch(folder, RecursiveMode::Recursive)
                .map_err(|e| Error::FolderWatch(format!("Failed to watch folder: {}", e)))?;
            info!(folder = %folder.display(), "watching descriptor folder");
        }

        if let Some(root) = &self.arrival_root {
            match self.watcher.watch(root, RecursiveMode::Recursive) {
                Ok(()) => info!(folder = %root.display(), "watching arrival tree"),
                Err(e) => error!(
                    folder = %root.display(),
                    error = %e,
                    "cannot watch arrival tree, relying on polling"
                ),
            }
        }

        Ok(())
    }

    /// Classify a raw event
    pub fn classify(&self, event: &Event) -> Vec<WatchEvent> {
        classify_event(event, &self.descriptor_folders, self.arrival_root.as_deref())
    }

    /// Run the event loop until `cancel` fires or the channel closes
    pub async fn run(mut self, intake: Arc<Intake>, reconciler: Arc<Reconciler>, cancel: CancellationToken) {
        info!("Folder watcher started");

        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(result) => result,
                    None => break,
                },
            };

            match result {
                Ok(event) => {
                    for watch_event in self.classify(&event) {
                        dispatch(watch_event, &intake, &reconciler).await;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Filesystem watcher error");
                }
            }
        }

        info!("Folder watcher stopped");
    }
}

/// Send a watch event to its handler
pub async fn dispatch(event: WatchEvent, intake: &Arc<Intake>, reconciler: &Reconciler) {
    match event {
        WatchEvent::DescriptorCreated(path) => {
            debug!(path = %path.display(), "descriptor event");
            // The handle is not awaited; the task reports its own outcome
            let _ = intake.dispatch(path).await;
        }
        WatchEvent::ArrivalCreated(path) => {
            debug!(path = %path.display(), "arrival event");
            reconciler.wake();
        }
    }
}

/// Turn a raw `notify` event into zero or more [`WatchEvent`]s
pub fn classify_event(
    event: &Event,
    descriptor_folders: &[PathBuf],
    arrival_root: Option<&Path>,
) -> Vec<WatchEvent> {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter_map(|path| {
            if descriptor_folders.iter().any(|f| path.starts_with(f)) {
                is_descriptor(path).then(|| WatchEvent::DescriptorCreated(path.clone()))
            } else if arrival_root.is_some_and(|root| path.starts_with(root)) {
                Some(WatchEvent::ArrivalCreated(path.clone()))
            } else {
                None
            }
        })
        .collect()
}
