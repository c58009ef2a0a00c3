//! Logging setup.
//!
//! Installs a `tracing` subscriber writing compact records to stderr and to a
//! daily-rolling file. `RUST_LOG` overrides the configured level.

use std::fs;
use std::path::PathBuf;

use time::macros::format_description;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::default_log_dir;
use crate::error::{PatchfetchError, PatchfetchResult};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Directive used when `RUST_LOG` is not set.
    pub default_directive: String,
    /// Directory for log files. `None` disables the file layer.
    pub log_dir: Option<PathBuf>,
    /// File name prefix; the date is appended by the appender.
    pub file_prefix: String,
    /// Whether to also log to stderr.
    pub stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_directive: "info".to_string(),
            log_dir: Some(default_log_dir()),
            file_prefix: "patchfetch.log".to_string(),
            stderr: true,
        }
    }
}

impl LogConfig {
    pub fn with_default_directive(mut self, directive: impl Into<String>) -> Self {
        self.default_directive = directive.into();
        self
    }

    pub fn with_log_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.log_dir = dir;
        self
    }

    pub fn with_stderr(mut self, enabled: bool) -> Self {
        self.stderr = enabled;
        self
    }

    /// Build the filter: `RUST_LOG` if set and valid, otherwise the default directive.
    fn env_filter(&self) -> PatchfetchResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.default_directive)
            .map_err(|e| PatchfetchError::Logging(format!("bad filter directive: {}", e)))
    }
}

/// Keeps the file writer alive. Buffered records are flushed when dropped.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    file: Option<WorkerGuard>,
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingGuard")
            .field("file", &self.file.is_some())
            .finish()
    }
}

/// Install the global subscriber.
///
/// Fails if the log directory cannot be created or a subscriber is already set.
pub fn init(config: LogConfig) -> PatchfetchResult<LoggingGuard> {
    let filter = config.env_filter()?;
    let timer = LocalTime::new(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    ));

    let stderr_layer = config.stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_timer(timer.clone())
            .compact()
    });

    let (file_layer, file_guard) = match &config.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|e| PatchfetchError::CreateDirFailed {
                path: dir.clone(),
                source: e,
            })?;
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_timer(timer)
                .with_ansi(false)
                .compact();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| PatchfetchError::Logging(e.to_string()))?;

    Ok(LoggingGuard { file: file_guard })
}
