//! Configuration for the Download Manager.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{PatchfetchError, PatchfetchResult};

/// Default number of attempts each registered source contributes to a file's budget.
pub const DEFAULT_ATTEMPTS_PER_SOURCE: u32 = 3;

/// Default size of the worker pool.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default wait when the pending queue is empty.
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(500);

/// Default wait when every source is busy.
pub const DEFAULT_BUSY_RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// How a worker picks a source for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceSelection {
    /// Offer the file to every source in registration order; first to accept wins.
    #[default]
    RegistrationOrder,
    /// Like `RegistrationOrder`, but skip sources that already failed this file
    /// since its last rotation.
    AvoidRecentFailures,
}

/// Configuration for the Download Manager.
#[derive(Debug, Clone)]
pub struct DownloadManagerConfig {
    /// Root that finished files are moved into.
    pub target_dir: PathBuf,

    /// Root that sources download into before the move.
    pub temp_dir: PathBuf,

    /// Attempts each source adds to a file's retry budget (at least 1).
    pub attempts_per_source: u32,

    /// Number of worker threads dispatching files to sources.
    pub worker_count: usize,

    /// Upper bound on how long an idle worker waits for new work.
    pub idle_interval: Duration,

    /// Upper bound on how long a worker waits for a busy source to free up.
    pub busy_retry_interval: Duration,

    /// Instance name, used in worker thread names and log fields.
    pub name: String,

    /// Source selection policy.
    pub source_selection: SourceSelection,
}

impl Default for DownloadManagerConfig {
    fn default() -> Self {
        Self {
            target_dir: PathBuf::from("."),
            temp_dir: std::env::temp_dir().join("patchfetch-staging"),
            attempts_per_source: DEFAULT_ATTEMPTS_PER_SOURCE,
            worker_count: DEFAULT_WORKER_COUNT,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            busy_retry_interval: DEFAULT_BUSY_RETRY_INTERVAL,
            name: "patchfetch".to_string(),
            source_selection: SourceSelection::default(),
        }
    }
}

impl DownloadManagerConfig {
    /// Create a configuration with the given target and temp roots.
    pub fn new(target_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            temp_dir: temp_dir.into(),
            ..Default::default()
        }
    }

    /// Set the attempts contributed by each source.
    pub fn with_attempts_per_source(mut self, attempts: u32) -> Self {
        self.attempts_per_source = attempts;
        self
    }

    /// Set the worker pool size.
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the idle wait.
    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Set the busy-retry wait.
    pub fn with_busy_retry_interval(mut self, interval: Duration) -> Self {
        self.busy_retry_interval = interval;
        self
    }

    /// Set the instance name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the source selection policy.
    pub fn with_source_selection(mut self, selection: SourceSelection) -> Self {
        self.source_selection = selection;
        self
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> PatchfetchResult<()> {
        if self.attempts_per_source == 0 {
            return Err(PatchfetchError::InvalidConfig(
                "attempts_per_source must be at least 1".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(PatchfetchError::InvalidConfig(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.idle_interval.is_zero() || self.busy_retry_interval.is_zero() {
            return Err(PatchfetchError::InvalidConfig(
                "worker wait intervals must be non-zero".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(PatchfetchError::InvalidConfig(
                "manager name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DownloadManagerConfig::default();
        assert_eq!(config.attempts_per_source, 3);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.idle_interval, Duration::from_millis(500));
        assert_eq!(config.busy_retry_interval, Duration::from_millis(500));
        assert_eq!(config.source_selection, SourceSelection::RegistrationOrder);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = DownloadManagerConfig::new("/game", "/tmp/stage")
            .with_attempts_per_source(2)
            .with_worker_count(8)
            .with_idle_interval(Duration::from_millis(20))
            .with_busy_retry_interval(Duration::from_millis(30))
            .with_name("client-updater")
            .with_source_selection(SourceSelection::AvoidRecentFailures);

        assert_eq!(config.target_dir, PathBuf::from("/game"));
        assert_eq!(config.temp_dir, PathBuf::from("/tmp/stage"));
        assert_eq!(config.attempts_per_source, 2);
        assert_eq!(config.worker_count, 8);
        assert_eq!(config.name, "client-updater");
        assert_eq!(
            config.source_selection,
            SourceSelection::AvoidRecentFailures
        );
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = DownloadManagerConfig::default().with_attempts_per_source(0);
        assert!(matches!(
            config.validate(),
            Err(PatchfetchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = DownloadManagerConfig::default().with_worker_count(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_name() {
        let config = DownloadManagerConfig::default().with_name("  ");
        assert!(config.validate().is_err());
    }
}
