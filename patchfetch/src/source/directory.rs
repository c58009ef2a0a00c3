//! Local directory mirror.
//!
//! Copies `{root}/{remote id}` into the staging path. Useful for mirrors on
//! a mounted network share or a patch set unpacked on disk.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use tracing::{debug, warn};

use super::error::SourceError;
use super::slots::SourceSlots;
use super::{DownloadJob, DownloadSource};

/// Download source that copies from a directory tree.
#[derive(Debug)]
pub struct DirectorySource {
    name: String,
    root: PathBuf,
    slots: SourceSlots,
}

impl DirectorySource {
    /// Create a source copying one file at a time from `root`.
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self::with_concurrency(name, root, 1)
    }

    /// Create a source allowing `concurrency` copies at once.
    pub fn with_concurrency(
        name: impl Into<String>,
        root: impl Into<PathBuf>,
        concurrency: usize,
    ) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            slots: SourceSlots::new(concurrency),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Copies currently running.
    pub fn active_downloads(&self) -> usize {
        self.slots.in_use()
    }
}

impl DownloadSource for DirectorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_begin_download(&self, job: DownloadJob) -> Result<(), DownloadJob> {
        let Some(slot) = self.slots.try_acquire() else {
            return Err(job);
        };

        let origin = job.remote().join_onto(&self.root);
        let source_name = self.name.clone();

        let spawned = thread::Builder::new()
            .name(format!("{}-copy", self.name))
            .spawn(move || {
                let result = copy_file(&origin, job.staging_path());
                drop(slot);
                match result {
                    Ok(bytes) => {
                        debug!(source = %source_name, remote = %job.remote(), bytes, "Copy complete");
                        job.complete();
                    }
                    Err(e) => {
                        debug!(source = %source_name, remote = %job.remote(), error = %e, "Copy failed");
                        job.fail(e.to_string());
                    }
                }
            });
        if let Err(e) = spawned {
            warn!(source = %self.name, error = %e, "Failed to spawn copy thread");
        }
        Ok(())
    }
}

fn copy_file(origin: &Path, dest: &Path) -> Result<u64, SourceError> {
    if !origin.is_file() {
        return Err(SourceError::Read {
            path: origin.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a file"),
        });
    }
    fs::copy(origin, dest).map_err(|e| SourceError::Write {
        path: dest.to_path_buf(),
        source: e,
    })
}
