//! Errors raised inside the built-in sources.
//!
//! These never leave a source: they are turned into the reason string of
//! [`DownloadJob::fail`](super::DownloadJob::fail).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    /// The request could not be sent or the body could not be read.
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    /// The request timed out.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// The server answered with a non-success status.
    #[error("GET {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// The remote id could not be turned into a URL.
    #[error("cannot build URL for {remote}: {reason}")]
    Url { remote: String, reason: String },

    /// Reading the origin file failed.
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    /// Writing the staging file failed.
    #[error("failed to write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },
}
