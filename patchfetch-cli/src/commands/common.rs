//! Common helpers shared across CLI commands.

use std::fs;
use std::path::Path;

use patchfetch::config::{ConfigFile, SourceEntry, SourceLocation};

use crate::error::CliError;

/// Load the config file at `path`, or the default one.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(config)
}

/// Turn `--source` values into source entries named `cli-1`, `cli-2`, ...
pub fn source_entries_from_flags(values: &[String]) -> Vec<SourceEntry> {
    values
        .iter()
        .filter(|v| !v.trim().is_empty())
        .enumerate()
        .map(|(i, value)| SourceEntry::new(format!("cli-{}", i + 1), SourceLocation::parse(value)))
        .collect()
}

/// Remote paths listed in a manifest: one per line, blank lines and `#`
/// comments skipped.
pub fn parse_manifest(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Read and parse a manifest file.
pub fn read_manifest(path: &Path) -> Result<Vec<String>, CliError> {
    let text = fs::read_to_string(path).map_err(|e| {
        CliError::Io(format!("cannot read manifest {}: {}", path.display(), e))
    })?;
    Ok(parse_manifest(&text))
}
