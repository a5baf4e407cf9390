//! Pending match queue
//!
//! FIFO of [`QueueEntry`] keyed by the lowercased expected filename. Intake
//! enqueues at any time; the reconciliation worker is the only consumer. An
//! entry taken by the worker is "checked out" until it is put back or
//! completed, and still counts as live for deduplication and snapshots.
//!
//! Re-enqueueing a filename that is already live resets it: the newer request
//! replaces destination, category and `enqueued_at`, and clears
//! `first_seen_at`. When the key is checked out, the replacement is parked and
//! takes the entry's place when the worker hands it back.

use crate::types::QueueEntry;
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;

/// What `enqueue` did with the entry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// New key appended at the tail
    Added,
    /// A waiting entry with the same key was reset in place
    Replaced,
    /// The key is checked out by the worker; the replacement is parked
    Deferred,
}

#[derive(Debug)]
struct CheckedOut {
    entry: QueueEntry,
    replacement: Option<QueueEntry>,
}

#[derive(Debug, Default)]
struct QueueState {
    waiting: VecDeque<QueueEntry>,
    checked_out: HashMap<String, CheckedOut>,
}

impl QueueState {
    fn position(&self, filename: &str) -> Option<usize> {
        self.waiting
            .iter()
            .position(|e| e.expected_filename == filename)
    }

    fn push_unique(&mut self, entry: QueueEntry) {
        match self.position(&entry.expected_filename) {
            Some(idx) => self.waiting[idx] = entry,
            None => self.waiting.push_back(entry),
        }
    }
}

/// Durable-by-snapshot FIFO of pending matches
#[derive(Debug, Default)]
pub struct PendingQueue {
    state: Mutex<QueueState>,
}

impl PendingQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, or reset the live entry with the same filename
    pub async fn enqueue(&self, entry: QueueEntry) -> EnqueueOutcome {
        let mut state = self.state.lock().await;
        let key = entry.expected_filename.clone();

        if let Some(slot) = state.checked_out.get_mut(&key) {
            slot.replacement = Some(entry);
            tracing::debug!(filename = %key, "entry checked out, replacement deferred");
            return EnqueueOutcome::Deferred;
        }

        match state.position(&key) {
            Some(idx) => {
                state.waiting[idx] = entry;
                tracing::debug!(filename = %key, "entry reset by duplicate enqueue");
                EnqueueOutcome::Replaced
            }
            None => {
                state.waiting.push_back(entry);
                EnqueueOutcome::Added
            }
        }
    }

    /// Check out the head entry
    pub async fn take_one(&self) -> Option<QueueEntry> {
        let mut state = self.state.lock().await;
        let entry = state.waiting.pop_front()?;
        state.checked_out.insert(
            entry.expected_filename.clone(),
            CheckedOut {
                entry: entry.clone(),
                replacement: None,
            },
        );
        Some(entry)
    }

    /// Return an unmatched entry to the tail
    ///
    /// If a newer request for the same filename arrived while the entry was
    /// checked out, the newer request goes back instead.
    pub async fn put_back(&self, entry: QueueEntry) {
        let mut state = self.state.lock().await;
        let returned = match state.checked_out.remove(&entry.expected_filename) {
            Some(CheckedOut {
                replacement: Some(newer),
                ..
            }) => newer,
            _ => entry,
        };
        state.push_unique(returned);
    }

    /// Finish a checked-out entry
    ///
    /// If a newer request for the same filename was parked while the entry
    /// was checked out, it is re-queued at the tail and returned.
    pub async fn complete(&self, filename: &str) -> Option<QueueEntry> {
        let mut state = self.state.lock().await;
        match state.checked_out.remove(filename) {
            Some(CheckedOut {
                replacement: Some(newer),
                ..
            }) => {
                state.push_unique(newer.clone());
                Some(newer)
            }
            Some(_) => None,
            None => {
                tracing::warn!(filename = %filename, "complete called for an entry that is not checked out");
                None
            }
        }
    }

    /// Every live entry, checked-out ones first, without duplicates
    pub async fn snapshot(&self) -> Vec<QueueEntry> {
        let state = self.state.lock().await;
        let mut out = Vec::with_capacity(state.waiting.len() + state.checked_out.len());

        let mut checked: Vec<&CheckedOut> = state.checked_out.values().collect();
        checked.sort_by_key(|c| c.entry.enqueued_at);
        for slot in checked {
            out.push(slot.replacement.as_ref().unwrap_or(&slot.entry).clone());
        }
        out.extend(state.waiting.iter().cloned());
        out
    }

    /// Replace the queue contents with a snapshot
    ///
    /// The first occurrence of each filename wins. Returns the number of
    /// entries restored.
    pub async fn restore(&self, entries: Vec<QueueEntry>) -> usize {
        let mut state = self.state.lock().await;
        state.waiting.clear();
        state.checked_out.clear();

        let mut seen = HashSet::new();
        for entry in entries {
            if seen.insert(entry.expected_filename.clone()) {
                state.waiting.push_back(entry);
            } else {
                tracing::warn!(filename = %entry.expected_filename, "dropping duplicate entry from snapshot");
            }
        }
        state.waiting.len()
    }

    /// Whether a live entry exists for the filename
    pub async fn contains(&self, filename: &str) -> bool {
        let state = self.state.lock().await;
        state.checked_out.contains_key(filename) || state.position(filename).is_some()
    }

    /// Number of live entries, including checked-out ones
    pub async fn len(&self) -> usize {
        let state = self.state.lock().await;
        state.waiting.len() + state.checked_out.len()
    }

    /// Whether the queue holds no live entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
