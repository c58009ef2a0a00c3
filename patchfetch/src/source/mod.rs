//! Download source abstraction.
//!
//! A download source is one interchangeable origin (an HTTP mirror, a local
//! directory, ...) that can fetch a remote file into a staging path. The
//! manager knows nothing about how a source works; it only offers jobs and
//! listens for the reports.
//!
//! # Contract
//!
//! ```text
//! manager ── try_begin_download(job) ──► source
//!              │                           │
//!              │ Err(job)  (busy)          │ Ok(())  (accepted)
//!              ▼                           ▼
//!        try next source           fetch on own thread
//!                                          │
//!                               job.complete() / job.fail(reason)
//!                                          │
//!                                          ▼
//!                                  manager completion
//! ```
//!
//! `try_begin_download` must not block on the download itself. Reporting
//! from inside `try_begin_download` (a source that completes synchronously)
//! is allowed.

mod directory;
mod error;
mod http;
mod job;
mod slots;

pub use directory::DirectorySource;
pub use error::SourceError;
pub use http::{HttpSource, DEFAULT_HTTP_TIMEOUT};
pub use job::DownloadJob;
pub use slots::{SlotGuard, SourceSlots};

pub(crate) use job::CompletionSink;

/// One interchangeable origin of remote files.
pub trait DownloadSource: Send + Sync {
    /// Human-readable name for logs.
    fn name(&self) -> &str;

    /// Start downloading `job` without blocking.
    ///
    /// Returns `Err(job)` untouched when the source is busy. On `Ok(())` the
    /// source owns the job and must report through it.
    fn try_begin_download(&self, job: DownloadJob) -> Result<(), DownloadJob>;
}
