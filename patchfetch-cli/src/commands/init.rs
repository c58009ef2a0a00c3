//! Init command - write a default configuration file.

use std::path::PathBuf;

use patchfetch::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Run the init command.
pub fn run(path: Option<PathBuf>, force: bool) -> Result<(), CliError> {
    let path = path.unwrap_or_else(config_file_path);
    write_default(&path, force)?;

    println!("Configuration file: {}", path.display());
    println!();
    println!("Set target_dir under [paths] and add mirrors under [sources].");
    println!("CLI arguments override config file values when specified.");
    Ok(())
}

fn write_default(path: &std::path::Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        )));
    }
    ConfigFile::default().save_to(path)?;
    Ok(())
}
