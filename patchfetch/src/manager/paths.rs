//! Remote file identifiers and path combination.
//!
//! A remote file id is a relative path such as `Content/Maps/town.map`. Ids
//! coming from different mirrors may use either `/` or `\` as separator; both
//! are folded to `/` when the id is created, so `a\b` and `a/b` are the same
//! file.

use std::fmt;
use std::path::{Path, PathBuf};

/// Identifier of a file to download, compared by byte equality of its
/// normalised form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteFileId(String);

impl RemoteFileId {
    /// Create a remote file id.
    ///
    /// Returns `None` for empty ids, rooted ids (leading separator or drive
    /// prefix) and ids containing a `..` component. Separators are folded to
    /// `/` and empty or `.` components dropped.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.starts_with('/') || trimmed.starts_with('\\') || trimmed.contains(':') {
            return None;
        }

        let mut components = Vec::new();
        for component in split_components(trimmed) {
            match component {
                ".." => return None,
                "." => {}
                other => components.push(other),
            }
        }
        if components.is_empty() {
            return None;
        }

        Some(Self(components.join("/")))
    }

    /// The normalised id, `/`-separated.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path components of the id.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }

    /// Join this id onto `root`.
    pub fn join_onto(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        for component in self.components() {
            path.push(component);
        }
        path
    }

    /// The id as a URL path (before percent-escaping).
    pub fn to_url_path(&self) -> String {
        self.0.clone()
    }
}

impl fmt::Display for RemoteFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RemoteFileId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn split_components(id: &str) -> impl Iterator<Item = &str> {
    id.split(['/', '\\']).filter(|c| !c.is_empty())
}

/// Staging and target roots of a manager.
#[derive(Debug, Clone)]
pub struct DownloadPaths {
    target_dir: PathBuf,
    temp_dir: PathBuf,
}

impl DownloadPaths {
    pub fn new(target_dir: PathBuf, temp_dir: PathBuf) -> Self {
        Self {
            target_dir,
            temp_dir,
        }
    }

    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Where a source writes the bytes for `remote`.
    pub fn staging_path(&self, remote: &RemoteFileId) -> PathBuf {
        remote.join_onto(&self.temp_dir)
    }

    /// Final location of `remote` once moved into place.
    pub fn target_path(&self, remote: &RemoteFileId) -> PathBuf {
        remote.join_onto(&self.target_dir)
    }
}
