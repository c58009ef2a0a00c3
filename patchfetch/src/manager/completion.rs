//! Completion handling: reports from sources arrive here on the source's thread.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, error, info, warn};

use super::events::DownloadEvent;
use super::paths::RemoteFileId;
use super::registry::SourceId;
use super::state::FailureOutcome;
use super::Shared;
use crate::source::CompletionSink;

impl CompletionSink for Shared {
    fn on_finished(&self, source: SourceId, remote: RemoteFileId) {
        if !self.registry.read().contains(source) {
            self.release_orphan(source, remote);
            return;
        }
        self.record_success(remote);
    }

    fn on_failed(&self, source: SourceId, remote: RemoteFileId, reason: String) {
        if !self.registry.read().contains(source) {
            self.release_orphan(source, remote);
            return;
        }
        debug!(manager = %self.name, source = %source, remote = %remote, reason = %reason, "Download attempt failed");
        self.record_failure(Some(source), remote, &reason);
    }
}

impl Shared {
    /// A source removed while it held `remote` has reported. Its outcome is
    /// not counted; the file goes back to the pending queue for the
    /// remaining sources.
    fn release_orphan(&self, source: SourceId, remote: RemoteFileId) {
        let released = {
            let mut state = self.state.lock();
            let released = state.release(&remote);
            state.bump_source_generation();
            released
        };
        self.source_freed.notify_all();

        if released {
            warn!(manager = %self.name, source = %source, remote = %remote, "Report from removed source ignored, file requeued");
            self.work_ready.notify_one();
        } else {
            warn!(manager = %self.name, source = %source, remote = %remote, "Report from removed source ignored");
        }
    }

    fn record_success(&self, remote: RemoteFileId) {
        let staging = self.paths.staging_path(&remote);
        let target = self.paths.target_path(&remote);

        let was_queued = {
            let mut state = self.state.lock();
            let was_queued = state.record_success(&remote);
            state.bump_source_generation();
            was_queued
        };
        self.source_freed.notify_all();

        if !was_queued {
            error!(
                manager = %self.name,
                remote = %remote,
                "Finished download was not in the active queue"
            );
        }

        match self.move_into_place(&staging, &target) {
            Ok(()) => {
                info!(manager = %self.name, remote = %remote, target = %target.display(), "Download finished");
                self.events
                    .emit(&DownloadEvent::DownloadFinished { remote, target });
            }
            Err(e) => {
                warn!(
                    manager = %self.name,
                    remote = %remote,
                    staging = %staging.display(),
                    target = %target.display(),
                    error = %e,
                    "Failed to move download into place"
                );
                self.state.lock().revoke_finished(&remote);
                self.events.emit(&DownloadEvent::FileMoveFailed {
                    remote,
                    staging,
                    target,
                    reason: e.to_string(),
                });
            }
        }
    }

    /// Count a failed attempt. `source` is `None` when no source was involved.
    pub(super) fn record_failure(
        &self,
        source: Option<SourceId>,
        remote: RemoteFileId,
        reason: &str,
    ) {
        let (max_attempts, registered) = {
            let registry = self.registry.read();
            (registry.max_attempts(), registry.ids())
        };

        let outcome = {
            let mut state = self.state.lock();
            let outcome = state.record_failure(&remote, source, max_attempts, &registered);
            state.bump_source_generation();
            outcome
        };
        self.source_freed.notify_all();

        match outcome {
            FailureOutcome::Retry {
                attempt,
                rotated,
                requeued,
            } => {
                if rotated {
                    debug!(manager = %self.name, remote = %remote, "Every source has failed this file, rotation reset");
                }
                if requeued {
                    debug!(
                        manager = %self.name,
                        remote = %remote,
                        attempt,
                        max_attempts,
                        reason,
                        "Retrying download"
                    );
                    self.work_ready.notify_one();
                } else {
                    error!(
                        manager = %self.name,
                        remote = %remote,
                        "Failed download was not in the active queue"
                    );
                }
            }
            FailureOutcome::Exhausted {
                attempts,
                was_queued,
            } => {
                if !was_queued {
                    error!(
                        manager = %self.name,
                        remote = %remote,
                        "Exhausted download was not in the active queue"
                    );
                }
                warn!(
                    manager = %self.name,
                    remote = %remote,
                    attempts,
                    reason,
                    "Download failed, retry budget exhausted"
                );
                self.events.emit(&DownloadEvent::DownloadFailed { remote });
            }
        }
    }

    /// Create the parent directory of `path`.
    pub(super) fn ensure_parent_dir(&self, path: &Path) -> io::Result<()> {
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        let _fs = self.fs_lock.lock();
        fs::create_dir_all(parent)
    }

    /// Replace `target` with `staging`.
    fn move_into_place(&self, staging: &Path, target: &Path) -> io::Result<()> {
        let _fs = self.fs_lock.lock();

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        match fs::remove_file(target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }

        match fs::rename(staging, target) {
            Ok(()) => Ok(()),
            // Rename fails across filesystems; fall back to copying.
            Err(rename_err) if staging.is_file() => {
                fs::copy(staging, target).map_err(|_| rename_err)?;
                if let Err(e) = fs::remove_file(staging) {
                    debug!(path = %staging.display(), error = %e, "Could not remove staged copy");
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
