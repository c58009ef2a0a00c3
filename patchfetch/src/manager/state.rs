//! Queue bookkeeping for the Download Manager.
//!
//! `QueueState` holds every per-file collection the manager tracks. It is
//! plain data with no locking of its own; the manager keeps it behind a
//! single mutex so each transition below happens atomically.
//!
//! # File lifecycle
//!
//! ```text
//!             enqueue
//!   (none) ───────────► queued ──── record_success ────► finished
//!     ▲                  │  ▲                                │
//!     │                  │  └── record_failure (retry) ──┐   │
//!     │                  │                               │   │
//!     │                  └──── record_failure ──► failed │   │
//!     │                        (budget spent)      │     │   │
//!     └────────────── enqueue ◄────────────────────┴─────┘───┘
//! ```
//!
//! A file is in at most one of queued, failed and finished at any time.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexSet;

use super::paths::RemoteFileId;
use super::registry::SourceId;

/// Result of recording a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    /// The file is still within its budget and was put back on the pending queue.
    Retry {
        /// Failures recorded so far, including this one.
        attempt: u32,
        /// Whether every registered source had now failed the file, clearing
        /// its failed-sources set.
        rotated: bool,
        /// False when the file was not queued, so it was not requeued.
        requeued: bool,
    },
    /// The budget is spent; the file moved to the failed list.
    Exhausted {
        /// Failures recorded, including this one.
        attempts: u32,
        /// False when the file was not in the queued set.
        was_queued: bool,
    },
}

#[derive(Debug, Default)]
pub struct QueueState {
    /// Files waiting for a worker, oldest first.
    pending: VecDeque<RemoteFileId>,
    /// Files enqueued and not yet finished or failed (pending or in flight).
    queued: IndexSet<RemoteFileId>,
    failure_counts: HashMap<RemoteFileId, u32>,
    failed_sources: HashMap<RemoteFileId, HashSet<SourceId>>,
    failed: IndexSet<RemoteFileId>,
    finished: IndexSet<RemoteFileId>,
    /// Bumped whenever a source may have become free.
    source_generation: u64,
}

impl QueueState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file to the queue.
    ///
    /// Returns false if the file is already queued. Finished and failed
    /// files are taken off their lists and queued from scratch.
    pub fn enqueue(&mut self, remote: RemoteFileId) -> bool {
        if self.queued.contains(&remote) {
            return false;
        }

        self.clear_failures(&remote);
        self.failed.shift_remove(&remote);
        self.finished.shift_remove(&remote);

        self.queued.insert(remote.clone());
        self.pending.push_back(remote);
        true
    }

    /// Take the oldest pending file, skipping entries no longer queued.
    pub fn pop_pending(&mut self) -> Option<RemoteFileId> {
        while let Some(remote) = self.pending.pop_front() {
            if self.queued.contains(&remote) {
                return Some(remote);
            }
        }
        None
    }

    /// Put a file that could not be dispatched back at the tail.
    pub fn push_pending(&mut self, remote: RemoteFileId) {
        self.pending.push_back(remote);
    }

    /// Put a queued file that is neither pending nor held by a registered
    /// source back on the pending queue. Returns false if the file is not
    /// queued or already pending.
    pub fn release(&mut self, remote: &RemoteFileId) -> bool {
        if !self.queued.contains(remote) || self.pending.contains(remote) {
            return false;
        }
        self.pending.push_back(remote.clone());
        true
    }

    /// Record a successful download.
    ///
    /// Returns whether the file was in the queued set.
    pub fn record_success(&mut self, remote: &RemoteFileId) -> bool {
        self.clear_failures(remote);
        self.failed.shift_remove(remote);
        let was_queued = self.queued.shift_remove(remote);
        self.finished.insert(remote.clone());
        was_queued
    }

    /// Undo the finished entry of a file whose move into place failed.
    pub fn revoke_finished(&mut self, remote: &RemoteFileId) {
        self.finished.shift_remove(remote);
    }

    /// Record a failed attempt.
    ///
    /// `registered` is the current source registry; once `failed_by`
    /// completes a full rotation over it, the file's failed-sources set is
    /// cleared. `None` as the failing source means the attempt failed before
    /// any source was involved.
    pub fn record_failure(
        &mut self,
        remote: &RemoteFileId,
        failed_by: Option<SourceId>,
        max_attempts: u32,
        registered: &[SourceId],
    ) -> FailureOutcome {
        let count = self.failure_counts.entry(remote.clone()).or_insert(0);
        *count += 1;
        let attempt = *count;

        if attempt > max_attempts {
            self.clear_failures(remote);
            let was_queued = self.queued.shift_remove(remote);
            self.pending.retain(|p| p != remote);
            self.failed.insert(remote.clone());
            return FailureOutcome::Exhausted {
                attempts: attempt,
                was_queued,
            };
        }

        let mut rotated = false;
        if let Some(source) = failed_by {
            let set = self.failed_sources.entry(remote.clone()).or_default();
            set.insert(source);
            if !registered.is_empty() && registered.iter().all(|id| set.contains(id)) {
                set.clear();
                rotated = true;
            }
        }

        let requeued = self.queued.contains(remote);
        if requeued {
            self.pending.push_back(remote.clone());
        }

        FailureOutcome::Retry {
            attempt,
            rotated,
            requeued,
        }
    }

    fn clear_failures(&mut self, remote: &RemoteFileId) {
        self.failure_counts.remove(remote);
        self.failed_sources.remove(remote);
    }

    pub fn failure_count(&self, remote: &RemoteFileId) -> u32 {
        self.failure_counts.get(remote).copied().unwrap_or(0)
    }

    /// Sources that failed `remote` since its last rotation, in id order.
    pub fn failed_sources(&self, remote: &RemoteFileId) -> Vec<SourceId> {
        let mut sources: Vec<SourceId> = self
            .failed_sources
            .get(remote)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        sources.sort_unstable();
        sources
    }

    pub fn is_queued(&self, remote: &RemoteFileId) -> bool {
        self.queued.contains(remote)
    }

    pub fn queued(&self) -> Vec<RemoteFileId> {
        self.queued.iter().cloned().collect()
    }

    pub fn failed(&self) -> Vec<RemoteFileId> {
        self.failed.iter().cloned().collect()
    }

    pub fn finished(&self) -> Vec<RemoteFileId> {
        self.finished.iter().cloned().collect()
    }

    pub fn queued_count(&self) -> usize {
        self.queued.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    pub fn finished_count(&self) -> usize {
        self.finished.len()
    }

    pub fn clear_failed(&mut self) {
        self.failed.clear();
    }

    pub fn clear_finished(&mut self) {
        self.finished.clear();
    }

    pub fn source_generation(&self) -> u64 {
        self.source_generation
    }

    pub fn bump_source_generation(&mut self) {
        self.source_generation = self.source_generation.wrapping_add(1);
    }
}
