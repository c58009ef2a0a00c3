//! Notifications raised by the Download Manager.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use parking_lot::RwLock;
use tracing::error;

use super::paths::RemoteFileId;

/// Something happened to a queued file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// The file was downloaded and moved to its target path.
    DownloadFinished {
        remote: RemoteFileId,
        target: PathBuf,
    },
    /// The file used up its retry budget. It will not be retried unless enqueued again.
    DownloadFailed { remote: RemoteFileId },
    /// The bytes were downloaded but could not be moved from staging to target.
    FileMoveFailed {
        remote: RemoteFileId,
        staging: PathBuf,
        target: PathBuf,
        reason: String,
    },
}

impl DownloadEvent {
    pub fn remote(&self) -> &RemoteFileId {
        match self {
            Self::DownloadFinished { remote, .. }
            | Self::DownloadFailed { remote }
            | Self::FileMoveFailed { remote, .. } => remote,
        }
    }
}

/// Handler invoked for every event.
pub type EventHandler = Arc<dyn Fn(&DownloadEvent) + Send + Sync>;

/// Fan-out of events to subscribed handlers.
///
/// Handlers run on whichever thread produced the event (a worker or a
/// source's own thread) with no manager lock held.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<Vec<EventHandler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: EventHandler) {
        self.handlers.write().push(handler);
    }

    /// Subscribe a channel sender; the subscription lapses once the receiver is dropped.
    pub fn subscribe_channel(&self) -> mpsc::Receiver<DownloadEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribe(Arc::new(move |event: &DownloadEvent| {
            let _ = tx.send(event.clone());
        }));
        rx
    }

    pub fn emit(&self, event: &DownloadEvent) {
        let handlers = self.handlers.read().clone();
        for handler in handlers {
            let result = panic::catch_unwind(AssertUnwindSafe(|| handler(event)));
            if result.is_err() {
                error!(remote = %event.remote(), "Download event handler panicked");
            }
        }
    }
}
