//! The unit of work handed to a download source.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Weak;

use tracing::warn;

use crate::manager::{RemoteFileId, SourceId};

/// Receiver of completion reports.
///
/// Implemented by the manager; jobs hold it weakly so an outstanding job
/// never keeps a disposed manager alive.
pub(crate) trait CompletionSink: Send + Sync {
    fn on_finished(&self, source: SourceId, remote: RemoteFileId);
    fn on_failed(&self, source: SourceId, remote: RemoteFileId, reason: String);
}

struct Reporter {
    sink: Weak<dyn CompletionSink>,
    source: SourceId,
}

/// A file offered to a [`DownloadSource`](super::DownloadSource).
///
/// A source that accepts the job must eventually call [`complete`](Self::complete)
/// once the bytes are at [`staging_path`](Self::staging_path), or
/// [`fail`](Self::fail) otherwise. Both consume the job, so a download is
/// reported exactly once. Dropping an accepted job without reporting counts
/// as a failure.
pub struct DownloadJob {
    remote: RemoteFileId,
    staging_path: PathBuf,
    reporter: Option<Reporter>,
}

impl DownloadJob {
    pub(crate) fn new(
        remote: RemoteFileId,
        staging_path: PathBuf,
        sink: Weak<dyn CompletionSink>,
        source: SourceId,
    ) -> Self {
        Self {
            remote,
            staging_path,
            reporter: Some(Reporter { sink, source }),
        }
    }

    /// The file to fetch.
    pub fn remote(&self) -> &RemoteFileId {
        &self.remote
    }

    /// Where the fetched bytes must be written. Its parent directory already exists.
    pub fn staging_path(&self) -> &Path {
        &self.staging_path
    }

    /// Report that the file is fully written to the staging path.
    pub fn complete(mut self) {
        if let Some(reporter) = self.reporter.take() {
            if let Some(sink) = reporter.sink.upgrade() {
                sink.on_finished(reporter.source, self.remote.clone());
            }
        }
    }

    /// Report that the download did not succeed.
    pub fn fail(mut self, reason: impl Into<String>) {
        if let Some(reporter) = self.reporter.take() {
            if let Some(sink) = reporter.sink.upgrade() {
                sink.on_failed(reporter.source, self.remote.clone(), reason.into());
            }
        }
    }

    /// Point the job at the next source to be offered it.
    pub(crate) fn assign(&mut self, source: SourceId) {
        if let Some(reporter) = self.reporter.as_mut() {
            reporter.source = source;
        }
    }

    /// Take the job back without reporting anything.
    pub(crate) fn disarm(mut self) -> RemoteFileId {
        self.reporter = None;
        self.remote.clone()
    }
}

impl Drop for DownloadJob {
    fn drop(&mut self) {
        if let Some(reporter) = self.reporter.take() {
            warn!(
                remote = %self.remote,
                source = %reporter.source,
                "Download job dropped without a report, counting it as failed"
            );
            if let Some(sink) = reporter.sink.upgrade() {
                sink.on_failed(
                    reporter.source,
                    self.remote.clone(),
                    "job dropped without a report".to_string(),
                );
            }
        }
    }
}

impl fmt::Debug for DownloadJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadJob")
            .field("remote", &self.remote)
            .field("staging_path", &self.staging_path)
            .field("armed", &self.reporter.is_some())
            .finish()
    }
}
