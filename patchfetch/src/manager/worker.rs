//! Worker loop: take a pending file and hand it to the first free source.
//!
//! A worker's responsibility for a file ends once a source accepts it; the
//! outcome arrives later through the job's report (see `completion`).

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use tracing::{debug, error, trace, warn};

use super::config::SourceSelection;
use super::paths::RemoteFileId;
use super::registry::RegisteredSource;
use super::Shared;
use crate::source::{CompletionSink, DownloadJob};

pub(super) fn run(shared: Arc<Shared>, index: usize) {
    debug!(manager = %shared.name, worker = index, "Download worker started");

    while !shared.is_disposed() {
        let Some(remote) = shared.next_pending() else {
            continue;
        };

        let mut handed_off = false;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            shared.dispatch(remote.clone(), &mut handed_off)
        }));
        if result.is_err() {
            if handed_off {
                // The job went down with the source; its drop already reported the failure.
                error!(
                    manager = %shared.name,
                    worker = index,
                    remote = %remote,
                    "Download source panicked while accepting a job"
                );
            } else {
                error!(
                    manager = %shared.name,
                    worker = index,
                    remote = %remote,
                    "Dispatch panicked, counting the attempt as failed"
                );
                shared.record_failure(None, remote, "dispatch panicked");
            }
        }
    }

    debug!(manager = %shared.name, worker = index, "Download worker stopped");
}

impl Shared {
    /// Pop the next pending file, waiting up to the idle interval for one.
    fn next_pending(&self) -> Option<RemoteFileId> {
        let mut state = self.state.lock();
        if let Some(remote) = state.pop_pending() {
            return Some(remote);
        }
        if self.is_disposed() {
            return None;
        }
        self.work_ready.wait_for(&mut state, self.idle_interval);
        state.pop_pending()
    }

    /// Offer `remote` to the sources.
    ///
    /// `handed_off` is true while a source holds the job, so a panic in the
    /// source is not counted a second time by the caller.
    fn dispatch(self: &Arc<Self>, remote: RemoteFileId, handed_off: &mut bool) {
        let staging = self.paths.staging_path(&remote);
        if let Err(e) = self.ensure_parent_dir(&staging) {
            warn!(
                manager = %self.name,
                remote = %remote,
                path = %staging.display(),
                error = %e,
                "Cannot create staging directory"
            );
            self.record_failure(None, remote, &format!("staging directory: {}", e));
            return;
        }

        let generation = self.state.lock().source_generation();
        let candidates = self.candidates_for(&remote);

        let Some(first) = candidates.first() else {
            trace!(manager = %self.name, remote = %remote, "No sources registered");
            self.wait_for_source(remote, generation);
            return;
        };

        let sink: Weak<dyn CompletionSink> = Arc::downgrade(self) as Weak<dyn CompletionSink>;
        let mut job = DownloadJob::new(remote, staging, sink, first.id);

        for candidate in &candidates {
            job.assign(candidate.id);
            *handed_off = true;
            match candidate.source.try_begin_download(job) {
                Ok(()) => {
                    debug!(
                        manager = %self.name,
                        source = %candidate.source.name(),
                        "Download dispatched"
                    );
                    return;
                }
                Err(returned) => {
                    *handed_off = false;
                    job = returned;
                }
            }
        }

        let remote = job.disarm();
        trace!(manager = %self.name, remote = %remote, "All sources busy");
        self.wait_for_source(remote, generation);
    }

    /// Sources to offer `remote` to, in the order they should be tried.
    fn candidates_for(&self, remote: &RemoteFileId) -> Vec<RegisteredSource> {
        let sources = self.registry.read().snapshot();
        if self.selection == SourceSelection::RegistrationOrder || sources.len() < 2 {
            return sources;
        }

        let recently_failed = self.state.lock().failed_sources(remote);
        if recently_failed.is_empty() {
            return sources;
        }
        let preferred: Vec<RegisteredSource> = sources
            .iter()
            .filter(|s| !recently_failed.contains(&s.id))
            .cloned()
            .collect();
        if preferred.is_empty() {
            sources
        } else {
            preferred
        }
    }

    /// Put `remote` back and wait until a source may have freed up.
    fn wait_for_source(&self, remote: RemoteFileId, generation: u64) {
        let mut state = self.state.lock();
        state.push_pending(remote);
        if state.source_generation() == generation && !self.is_disposed() {
            self.source_freed
                .wait_for(&mut state, self.busy_retry_interval);
        }
    }
}
