//! INI configuration file.
//!
//! Settings live in `~/.config/patchfetch/config.ini` (or the platform
//! equivalent). A missing file yields defaults; command line flags override
//! file values.
//!
//! # Layout
//!
//! ```ini
//! [paths]
//! target_dir = /games/client
//! temp_dir = /games/client/.staging
//!
//! [download]
//! attempts_per_source = 3
//! workers = 4
//! idle_interval_ms = 500
//! busy_retry_ms = 500
//! avoid_failed_sources = false
//! http_timeout_secs = 300
//! source_concurrency = 1
//!
//! [sources]
//! primary = https://mirror1.example.com/patch/
//! backup = /mnt/mirror
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ini::Ini;
use tracing::debug;

use crate::error::{PatchfetchError, PatchfetchResult};
use crate::manager::{
    DownloadManagerConfig, SourceSelection, DEFAULT_ATTEMPTS_PER_SOURCE,
    DEFAULT_BUSY_RETRY_INTERVAL, DEFAULT_IDLE_INTERVAL, DEFAULT_WORKER_COUNT,
};
use crate::source::{DirectorySource, DownloadSource, HttpSource, DEFAULT_HTTP_TIMEOUT};

const SECTION_PATHS: &str = "paths";
const SECTION_DOWNLOAD: &str = "download";
const SECTION_SOURCES: &str = "sources";

/// Directory name under the platform config and cache roots.
pub const APP_DIR_NAME: &str = "patchfetch";

/// Path of the default configuration file.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
        .join("config.ini")
}

/// Default directory for log files.
pub fn default_log_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
        .join("logs")
}

// =============================================================================
// Sections
// =============================================================================

/// `[paths]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathsSettings {
    /// Root finished files are moved into.
    pub target_dir: Option<PathBuf>,
    /// Staging root. Defaults to `.patchfetch-staging` under the target.
    pub temp_dir: Option<PathBuf>,
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    pub attempts_per_source: u32,
    pub workers: usize,
    pub idle_interval_ms: u64,
    pub busy_retry_ms: u64,
    pub avoid_failed_sources: bool,
    pub http_timeout_secs: u64,
    /// Concurrent downloads allowed per source.
    pub source_concurrency: usize,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            attempts_per_source: DEFAULT_ATTEMPTS_PER_SOURCE,
            workers: DEFAULT_WORKER_COUNT,
            idle_interval_ms: DEFAULT_IDLE_INTERVAL.as_millis() as u64,
            busy_retry_ms: DEFAULT_BUSY_RETRY_INTERVAL.as_millis() as u64,
            avoid_failed_sources: false,
            http_timeout_secs: DEFAULT_HTTP_TIMEOUT.as_secs(),
            source_concurrency: 1,
        }
    }
}

/// Where a source fetches from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// An `http://` or `https://` base URL.
    Http(String),
    /// A local directory tree.
    Directory(PathBuf),
}

impl SourceLocation {
    /// Classify a location string: anything with an http(s) scheme is a URL,
    /// everything else a directory.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        let lower = value.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            SourceLocation::Http(value.to_string())
        } else {
            SourceLocation::Directory(PathBuf::from(value))
        }
    }

    /// The location as written in the config file.
    pub fn to_config_string(&self) -> String {
        match self {
            SourceLocation::Http(url) => url.clone(),
            SourceLocation::Directory(path) => path.to_string_lossy().into_owned(),
        }
    }
}

/// One entry of the `[sources]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub name: String,
    pub location: SourceLocation,
}

impl SourceEntry {
    pub fn new(name: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            name: name.into(),
            location,
        }
    }

    /// Construct the download source this entry describes.
    pub fn build(&self, download: &DownloadSettings) -> PatchfetchResult<Arc<dyn DownloadSource>> {
        let concurrency = download.source_concurrency.max(1);
        let source: Arc<dyn DownloadSource> = match &self.location {
            SourceLocation::Http(url) => Arc::new(HttpSource::with_settings(
                self.name.clone(),
                url,
                Duration::from_secs(download.http_timeout_secs),
                concurrency,
            )?),
            SourceLocation::Directory(root) => Arc::new(DirectorySource::with_concurrency(
                self.name.clone(),
                root.clone(),
                concurrency,
            )),
        };
        Ok(source)
    }
}

// =============================================================================
// ConfigFile
// =============================================================================

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub paths: PathsSettings,
    pub download: DownloadSettings,
    /// Sources in file order.
    pub sources: Vec<SourceEntry>,
}

impl ConfigFile {
    /// Load from the default location.
    pub fn load() -> PatchfetchResult<Self> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> PatchfetchResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path).map_err(|e| PatchfetchError::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&text, path)
    }

    /// Parse INI text. `path` is only used in error messages.
    pub fn parse(text: &str, path: &Path) -> PatchfetchResult<Self> {
        let ini = Ini::load_from_str(text).map_err(|e| PatchfetchError::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let parse_err = |reason: String| PatchfetchError::ConfigParse {
            path: path.to_path_buf(),
            reason,
        };

        let mut config = Self::default();

        if let Some(section) = ini.section(Some(SECTION_PATHS)) {
            config.paths.target_dir = non_empty(section.get("target_dir")).map(PathBuf::from);
            config.paths.temp_dir = non_empty(section.get("temp_dir")).map(PathBuf::from);
        }

        if let Some(section) = ini.section(Some(SECTION_DOWNLOAD)) {
            let d = &mut config.download;
            let get = |key: &str| non_empty(section.get(key));

            if let Some(v) = get("attempts_per_source") {
                d.attempts_per_source = parse_number(SECTION_DOWNLOAD, "attempts_per_source", v)
                    .map_err(parse_err)?;
            }
            if let Some(v) = get("workers") {
                d.workers = parse_number(SECTION_DOWNLOAD, "workers", v).map_err(parse_err)?;
            }
            if let Some(v) = get("idle_interval_ms") {
                d.idle_interval_ms =
                    parse_number(SECTION_DOWNLOAD, "idle_interval_ms", v).map_err(parse_err)?;
            }
            if let Some(v) = get("busy_retry_ms") {
                d.busy_retry_ms =
                    parse_number(SECTION_DOWNLOAD, "busy_retry_ms", v).map_err(parse_err)?;
            }
            if let Some(v) = get("avoid_failed_sources") {
                d.avoid_failed_sources =
                    parse_bool(SECTION_DOWNLOAD, "avoid_failed_sources", v).map_err(parse_err)?;
            }
            if let Some(v) = get("http_timeout_secs") {
                d.http_timeout_secs =
                    parse_number(SECTION_DOWNLOAD, "http_timeout_secs", v).map_err(parse_err)?;
            }
            if let Some(v) = get("source_concurrency") {
                d.source_concurrency =
                    parse_number(SECTION_DOWNLOAD, "source_concurrency", v).map_err(parse_err)?;
            }
        }

        if let Some(section) = ini.section(Some(SECTION_SOURCES)) {
            for (name, value) in section.iter() {
                if value.trim().is_empty() {
                    continue;
                }
                config
                    .sources
                    .push(SourceEntry::new(name, SourceLocation::parse(value)));
            }
        }

        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> PatchfetchResult<()> {
        self.save_to(&config_file_path())
    }

    /// Save to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> PatchfetchResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| PatchfetchError::CreateDirFailed {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        self.to_ini()
            .write_to_file(path)
            .map_err(|e| PatchfetchError::ConfigWrite {
                path: path.to_path_buf(),
                source: e,
            })
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();

        let path_value =
            |p: &Option<PathBuf>| p.as_ref().map(|p| p.to_string_lossy().into_owned());
        ini.with_section(Some(SECTION_PATHS))
            .set(
                "target_dir",
                path_value(&self.paths.target_dir).unwrap_or_default(),
            )
            .set(
                "temp_dir",
                path_value(&self.paths.temp_dir).unwrap_or_default(),
            );

        let d = &self.download;
        ini.with_section(Some(SECTION_DOWNLOAD))
            .set("attempts_per_source", d.attempts_per_source.to_string())
            .set("workers", d.workers.to_string())
            .set("idle_interval_ms", d.idle_interval_ms.to_string())
            .set("busy_retry_ms", d.busy_retry_ms.to_string())
            .set("avoid_failed_sources", d.avoid_failed_sources.to_string())
            .set("http_timeout_secs", d.http_timeout_secs.to_string())
            .set("source_concurrency", d.source_concurrency.to_string());

        for entry in &self.sources {
            ini.with_section(Some(SECTION_SOURCES))
                .set(entry.name.as_str(), entry.location.to_config_string());
        }

        ini
    }

    /// Build a manager configuration. Fails if no target directory is set.
    pub fn to_manager_config(&self) -> PatchfetchResult<DownloadManagerConfig> {
        let target_dir = self.paths.target_dir.clone().ok_or_else(|| {
            PatchfetchError::InvalidConfig("[paths] target_dir is not set".to_string())
        })?;
        let temp_dir = self
            .paths
            .temp_dir
            .clone()
            .unwrap_or_else(|| target_dir.join(".patchfetch-staging"));

        let d = &self.download;
        let selection = if d.avoid_failed_sources {
            SourceSelection::AvoidRecentFailures
        } else {
            SourceSelection::RegistrationOrder
        };

        let config = DownloadManagerConfig::new(target_dir, temp_dir)
            .with_attempts_per_source(d.attempts_per_source)
            .with_worker_count(d.workers)
            .with_idle_interval(Duration::from_millis(d.idle_interval_ms))
            .with_busy_retry_interval(Duration::from_millis(d.busy_retry_ms))
            .with_source_selection(selection);
        config.validate()?;
        Ok(config)
    }

    /// Construct every configured source, in file order.
    pub fn build_sources(&self) -> PatchfetchResult<Vec<Arc<dyn DownloadSource>>> {
        self.sources
            .iter()
            .map(|entry| entry.build(&self.download))
            .collect()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_number<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("[{}] {}: expected a number, got '{}'", section, key, value))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(format!(
            "[{}] {}: expected true or false, got '{}'",
            section, key, value
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> PatchfetchResult<ConfigFile> {
        ConfigFile::parse(text, Path::new("config.ini"))
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_parse_full_file() {
        let config = parse(
            r#"
[paths]
target_dir = /games/client
temp_dir = /games/stage

[download]
attempts_per_source = 5
workers = 2
idle_interval_ms = 250
busy_retry_ms = 100
avoid_failed_sources = yes
http_timeout_secs = 60
source_concurrency = 3

[sources]
primary = https://mirror1.example.com/patch/
backup = /mnt/mirror
"#,
        )
        .unwrap();

        assert_eq!(config.paths.target_dir, Some(PathBuf::from("/games/client")));
        assert_eq!(config.paths.temp_dir, Some(PathBuf::from("/games/stage")));
        assert_eq!(config.download.attempts_per_source, 5);
        assert_eq!(config.download.workers, 2);
        assert_eq!(config.download.idle_interval_ms, 250);
        assert_eq!(config.download.busy_retry_ms, 100);
        assert!(config.download.avoid_failed_sources);
        assert_eq!(config.download.http_timeout_secs, 60);
        assert_eq!(config.download.source_concurrency, 3);
        assert_eq!(
            config.sources,
            vec![
                SourceEntry::new(
                    "primary",
                    SourceLocation::Http("https://mirror1.example.com/patch/".into())
                ),
                SourceEntry::new("backup", SourceLocation::Directory("/mnt/mirror".into())),
            ]
        );
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let config = parse("[download]\nworkers = 8\ncolour = blue\n[extra]\nx = 1\n").unwrap();
        assert_eq!(config.download.workers, 8);
    }

    #[test]
    fn test_invalid_number_names_key() {
        let err = parse("[download]\nworkers = many\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("[download] workers"), "{}", msg);
        assert!(msg.contains("many"));
    }

    #[test]
    fn test_invalid_bool_names_key() {
        let err = parse("[download]\navoid_failed_sources = maybe\n").unwrap_err();
        assert!(err.to_string().contains("avoid_failed_sources"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.paths.target_dir = Some(PathBuf::from("/games/client"));
        config.download.workers = 6;
        config.download.avoid_failed_sources = true;
        config.sources.push(SourceEntry::new(
            "primary",
            SourceLocation::Http("https://mirror.example.com/".into()),
        ));
        config.sources.push(SourceEntry::new(
            "disk",
            SourceLocation::Directory("/mnt/mirror".into()),
        ));

        config.save_to(&path).unwrap();
        let loaded = ConfigFile::load_from(&path).unwrap();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_source_location_parse() {
        assert_eq!(
            SourceLocation::parse("HTTPS://Mirror.example.com"),
            SourceLocation::Http("HTTPS://Mirror.example.com".into())
        );
        assert_eq!(
            SourceLocation::parse(" /mnt/patch "),
            SourceLocation::Directory("/mnt/patch".into())
        );
        assert_eq!(
            SourceLocation::parse("mirror"),
            SourceLocation::Directory("mirror".into())
        );
    }

    #[test]
    fn test_manager_config_requires_target() {
        let err = ConfigFile::default().to_manager_config().unwrap_err();
        assert!(err.to_string().contains("target_dir"));
    }

    #[test]
    fn test_manager_config_from_file_values() {
        let mut config = ConfigFile::default();
        config.paths.target_dir = Some(PathBuf::from("/games/client"));
        config.download.attempts_per_source = 2;
        config.download.busy_retry_ms = 50;
        config.download.avoid_failed_sources = true;

        let manager_config = config.to_manager_config().unwrap();

        assert_eq!(manager_config.target_dir, PathBuf::from("/games/client"));
        assert_eq!(
            manager_config.temp_dir,
            PathBuf::from("/games/client/.patchfetch-staging")
        );
        assert_eq!(manager_config.attempts_per_source, 2);
        assert_eq!(manager_config.busy_retry_interval, Duration::from_millis(50));
        assert_eq!(
            manager_config.source_selection,
            SourceSelection::AvoidRecentFailures
        );
    }

    #[test]
    fn test_manager_config_rejects_zero_workers() {
        let mut config = ConfigFile::default();
        config.paths.target_dir = Some(PathBuf::from("/games/client"));
        config.download.workers = 0;
        assert!(config.to_manager_config().is_err());
    }

    #[test]
    fn test_build_sources_in_file_order() {
        let mut config = ConfigFile::default();
        config.sources.push(SourceEntry::new(
            "web",
            SourceLocation::Http("http://127.0.0.1:9/".into()),
        ));
        config.sources.push(SourceEntry::new(
            "disk",
            SourceLocation::Directory("/mnt/mirror".into()),
        ));

        let sources = config.build_sources().unwrap();

        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["web", "disk"]);
    }

    #[test]
    fn test_build_sources_rejects_bad_url() {
        let mut config = ConfigFile::default();
        config.sources.push(SourceEntry::new(
            "web",
            SourceLocation::Http("http://[broken".into()),
        ));
        assert!(config.build_sources().is_err());
    }
}
