//! Error types for patchfetch.
//!
//! Per-file download problems are never reported through these types; they
//! surface as [`DownloadEvent`](crate::manager::DownloadEvent)s. The errors
//! here cover setup: configuration, worker startup and logging.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for patchfetch operations.
pub type PatchfetchResult<T> = Result<T, PatchfetchError>;

/// Errors that can occur while configuring or starting patchfetch components.
#[derive(Debug, Error)]
pub enum PatchfetchError {
    /// A configuration value is out of range or missing.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read the configuration file.
    #[error("failed to read config file {}: {source}", path.display())]
    ConfigRead { path: PathBuf, source: io::Error },

    /// The configuration file is not valid INI or holds an unparsable value.
    #[error("failed to parse config file {}: {reason}", path.display())]
    ConfigParse { path: PathBuf, reason: String },

    /// Failed to write the configuration file.
    #[error("failed to write config file {}: {source}", path.display())]
    ConfigWrite { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread {name}: {source}")]
    WorkerSpawn { name: String, source: io::Error },

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    /// A source URL could not be parsed.
    #[error("invalid source URL {url}: {reason}")]
    InvalidSourceUrl { url: String, reason: String },

    /// The tracing subscriber could not be installed.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display() {
        let err = PatchfetchError::InvalidConfig("attempts_per_source must be at least 1".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: attempts_per_source must be at least 1"
        );
    }

    #[test]
    fn test_config_parse_display() {
        let err = PatchfetchError::ConfigParse {
            path: PathBuf::from("/etc/patchfetch/config.ini"),
            reason: "[download] workers: expected a number".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/etc/patchfetch/config.ini"));
        assert!(msg.contains("workers"));
    }

    #[test]
    fn test_io_source_is_exposed() {
        use std::error::Error as _;

        let err = PatchfetchError::CreateDirFailed {
            path: PathBuf::from("/tmp/x"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.source().is_some());
    }
}
