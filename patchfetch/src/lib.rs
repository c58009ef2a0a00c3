//! patchfetch - multi-source patch downloader
//!
//! This library downloads a queue of game patch files from a pool of
//! interchangeable mirrors. Each file is retried across mirrors within a
//! budget derived from the number of registered sources, staged in a temp
//! directory, and moved into the target tree once complete.
//!
//! - [`manager`] - queue, retry accounting, worker pool and events
//! - [`source`] - the [`DownloadSource`] trait plus HTTP and directory mirrors
//! - [`config`] - the INI configuration file
//! - [`logging`] - `tracing` subscriber setup

pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod source;

pub use error::{PatchfetchError, PatchfetchResult};
pub use manager::{
    DownloadEvent, DownloadManager, DownloadManagerConfig, RemoteFileId, SourceId,
    SourceSelection,
};
pub use source::{DirectorySource, DownloadJob, DownloadSource, HttpSource};

/// Crate version, for banners.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
