//! Multi-source download manager.
//!
//! The manager owns a queue of remote files, a pool of interchangeable
//! [`DownloadSource`]s and a fixed pool of worker threads. Workers pull files
//! off the queue and offer them to the sources; sources report back on their
//! own threads, and the manager either moves the staged file into place or
//! counts the failure against the file's retry budget.
//!
//! # Architecture
//!
//! ```text
//!  enqueue ──► QueueState (pending FIFO + queued set)
//!                   │
//!                   ▼
//!            worker threads ── try_begin_download ──► DownloadSource(s)
//!                   ▲                                      │
//!                   │ requeue (busy / retry)               │ job.complete() / job.fail()
//!                   │                                      ▼
//!                   └──────────────────────────── completion handling
//!                                                    │
//!                                     move {temp}/{id} → {target}/{id}
//!                                                    │
//!                                                    ▼
//!                                              DownloadEvent
//! ```
//!
//! # Locking
//!
//! - `state` guards every per-file collection.
//! - `registry` guards the sources. It may be taken before `state`, never while
//!   `state` is held.
//! - `fs_lock` serialises directory creation and the delete+rename of a move.
//! - No lock is held while calling into a source or an event handler.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use patchfetch::manager::{DownloadManager, DownloadManagerConfig};
//! use patchfetch::source::HttpSource;
//!
//! let manager = DownloadManager::new(DownloadManagerConfig::new("/game", "/tmp/stage"))?;
//! manager.add_source(Arc::new(HttpSource::new("primary", "https://mirror.example.com/patch/")?));
//!
//! let events = manager.subscribe_channel();
//! manager.enqueue("Data/Maps/1.map");
//! let event = events.recv()?;
//! ```

mod completion;
mod config;
mod events;
mod paths;
mod registry;
mod state;
mod worker;

pub use config::{
    DownloadManagerConfig, SourceSelection, DEFAULT_ATTEMPTS_PER_SOURCE,
    DEFAULT_BUSY_RETRY_INTERVAL, DEFAULT_IDLE_INTERVAL, DEFAULT_WORKER_COUNT,
};
pub use events::{DownloadEvent, EventHandler};
pub use paths::{DownloadPaths, RemoteFileId};
pub use registry::{compute_max_attempts, SourceId, MAX_MAX_ATTEMPTS, MIN_MAX_ATTEMPTS};

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, info};

use crate::error::{PatchfetchError, PatchfetchResult};
use crate::source::DownloadSource;
use events::EventBus;
use registry::SourceRegistry;
use state::QueueState;

/// State shared between the manager handle, its workers and outstanding jobs.
struct Shared {
    name: String,
    paths: DownloadPaths,
    selection: SourceSelection,
    idle_interval: Duration,
    busy_retry_interval: Duration,
    state: Mutex<QueueState>,
    /// Signalled when a file is pushed onto the pending queue.
    work_ready: Condvar,
    /// Signalled when a source may have become free.
    source_freed: Condvar,
    registry: RwLock<SourceRegistry>,
    fs_lock: Mutex<()>,
    events: EventBus,
    disposed: AtomicBool,
}

impl Shared {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Record that a source may be free and wake workers waiting on one.
    fn signal_source_freed(&self) {
        self.state.lock().bump_source_generation();
        self.source_freed.notify_all();
    }
}

/// Downloads queued files from a pool of interchangeable sources.
///
/// Dropping the manager disposes it.
pub struct DownloadManager {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl DownloadManager {
    /// Create a manager and start its worker pool.
    pub fn new(config: DownloadManagerConfig) -> PatchfetchResult<Self> {
        config.validate()?;

        let shared = Arc::new(Shared {
            name: config.name.clone(),
            paths: DownloadPaths::new(config.target_dir.clone(), config.temp_dir.clone()),
            selection: config.source_selection,
            idle_interval: config.idle_interval,
            busy_retry_interval: config.busy_retry_interval,
            state: Mutex::new(QueueState::new()),
            work_ready: Condvar::new(),
            source_freed: Condvar::new(),
            registry: RwLock::new(SourceRegistry::new(config.attempts_per_source)),
            fs_lock: Mutex::new(()),
            events: EventBus::new(),
            disposed: AtomicBool::new(false),
        });

        let manager = Self {
            shared: Arc::clone(&shared),
            workers: Mutex::new(Vec::with_capacity(config.worker_count)),
        };

        for index in 0..config.worker_count {
            let thread_name = format!("{}-worker-{}", config.name, index);
            let worker_shared = Arc::clone(&shared);
            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || worker::run(worker_shared, index))
                .map_err(|e| PatchfetchError::WorkerSpawn {
                    name: thread_name,
                    source: e,
                })?;
            manager.workers.lock().push(handle);
        }

        info!(
            manager = %config.name,
            workers = config.worker_count,
            target = %config.target_dir.display(),
            temp = %config.temp_dir.display(),
            "Download manager started"
        );

        Ok(manager)
    }

    // =========================================================================
    // Queue
    // =========================================================================

    /// Queue a file for download.
    ///
    /// Returns false if the id is invalid, the file is already queued, or the
    /// manager has been disposed. A finished or failed file is queued again
    /// from scratch.
    pub fn enqueue(&self, remote: impl Into<String>) -> bool {
        let Some(remote) = RemoteFileId::new(remote) else {
            return false;
        };
        self.enqueue_id(remote)
    }

    /// Queue an already validated id.
    pub fn enqueue_id(&self, remote: RemoteFileId) -> bool {
        if self.shared.is_disposed() {
            return false;
        }

        let added = self.shared.state.lock().enqueue(remote.clone());
        if added {
            debug!(manager = %self.shared.name, remote = %remote, "File queued");
            self.shared.work_ready.notify_one();
        }
        added
    }

    /// Queue every file, ignoring individual results.
    pub fn enqueue_all<I, S>(&self, files: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for file in files {
            self.enqueue(file);
        }
    }

    /// Files enqueued and not yet finished or failed, in enqueue order.
    pub fn queue(&self) -> Vec<RemoteFileId> {
        self.shared.state.lock().queued()
    }

    /// Files that used up their retry budget.
    pub fn failed_downloads(&self) -> Vec<RemoteFileId> {
        self.shared.state.lock().failed()
    }

    /// Files downloaded and moved into place.
    ///
    /// A file whose move fails is taken off this list and reported with
    /// [`DownloadEvent::FileMoveFailed`], so every entry exists under the
    /// target directory when it was listed.
    pub fn finished(&self) -> Vec<RemoteFileId> {
        self.shared.state.lock().finished()
    }

    pub fn queue_count(&self) -> usize {
        self.shared.state.lock().queued_count()
    }

    /// Queued files not currently handed to a source.
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().pending_count()
    }

    pub fn failed_count(&self) -> usize {
        self.shared.state.lock().failed_count()
    }

    pub fn finished_count(&self) -> usize {
        self.shared.state.lock().finished_count()
    }

    /// True when nothing is queued or in flight.
    pub fn is_idle(&self) -> bool {
        self.queue_count() == 0
    }

    pub fn clear_failed(&self) {
        self.shared.state.lock().clear_failed();
    }

    pub fn clear_finished(&self) {
        self.shared.state.lock().clear_finished();
    }

    /// Failed attempts recorded for `remote` since it was last queued fresh.
    pub fn failure_count(&self, remote: &RemoteFileId) -> u32 {
        self.shared.state.lock().failure_count(remote)
    }

    /// Sources that failed `remote` since its last rotation.
    pub fn failed_sources(&self, remote: &RemoteFileId) -> Vec<SourceId> {
        self.shared.state.lock().failed_sources(remote)
    }

    // =========================================================================
    // Sources
    // =========================================================================

    /// Register a source. Returns false if this exact source is already registered.
    pub fn add_source(&self, source: Arc<dyn DownloadSource>) -> bool {
        let name = source.name().to_string();
        let (id, max_attempts) = {
            let mut registry = self.shared.registry.write();
            match registry.add(source) {
                Some(id) => (id, registry.max_attempts()),
                None => return false,
            }
        };

        self.shared.signal_source_freed();
        info!(
            manager = %self.shared.name,
            source = %name,
            id = %id,
            max_attempts,
            "Download source added"
        );
        true
    }

    /// Unregister a source. Returns false if it was not registered.
    ///
    /// Reports that arrive later from downloads the source already accepted
    /// are ignored.
    pub fn remove_source(&self, source: &Arc<dyn DownloadSource>) -> bool {
        let (id, max_attempts) = {
            let mut registry = self.shared.registry.write();
            match registry.remove(source) {
                Some(id) => (id, registry.max_attempts()),
                None => return false,
            }
        };

        info!(
            manager = %self.shared.name,
            source = %source.name(),
            id = %id,
            max_attempts,
            "Download source removed"
        );
        true
    }

    /// Registration id of `source`, if registered.
    pub fn source_id(&self, source: &Arc<dyn DownloadSource>) -> Option<SourceId> {
        self.shared.registry.read().id_of(source)
    }

    pub fn source_count(&self) -> usize {
        self.shared.registry.read().len()
    }

    /// Retry budget per file: `clamp(sources * attempts_per_source, 3, 255)`.
    pub fn max_attempts(&self) -> u32 {
        self.shared.registry.read().max_attempts()
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Call `handler` for every event.
    ///
    /// Handlers run on worker or source threads and must not block for long.
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(&DownloadEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(Arc::new(handler));
    }

    /// Receive every event on a channel.
    pub fn subscribe_channel(&self) -> mpsc::Receiver<DownloadEvent> {
        self.shared.events.subscribe_channel()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn target_dir(&self) -> &Path {
        self.shared.paths.target_dir()
    }

    pub fn temp_dir(&self) -> &Path {
        self.shared.paths.temp_dir()
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    /// Stop handing out work and join the workers.
    ///
    /// Downloads already accepted by a source keep running and their reports
    /// are still processed. Calling this more than once has no effect.
    pub fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        // Taking the lock orders the flag before any worker's next wait.
        drop(self.shared.state.lock());
        self.shared.work_ready.notify_all();
        self.shared.source_freed.notify_all();

        let handles = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!(manager = %self.shared.name, "Download worker panicked");
            }
        }

        info!(manager = %self.shared.name, "Download manager disposed");
    }
}

impl Drop for DownloadManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadManager")
            .field("name", &self.shared.name)
            .field("paths", &self.shared.paths)
            .field("disposed", &self.shared.is_disposed())
            .finish_non_exhaustive()
    }
}
