//! CLI error types.

use std::fmt;

use patchfetch::PatchfetchError;

/// Errors reported by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Configuration is missing or invalid.
    Config(String),

    /// Invalid command line arguments.
    Arguments(String),

    /// Reading the manifest or writing files failed.
    Io(String),

    /// Library setup failed.
    Setup(PatchfetchError),

    /// Some files could not be downloaded or moved into place.
    Incomplete { failed: usize, move_failed: usize },

    /// The run was interrupted with Ctrl+C.
    Interrupted,
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Incomplete { .. } => 1,
            CliError::Arguments(_) => 2,
            CliError::Interrupted => 130,
            CliError::Io(_) => 74,
            CliError::Config(_) | CliError::Setup(_) => 78,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Arguments(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::Io(msg) => write!(f, "IO error: {}", msg),
            CliError::Setup(e) => write!(f, "{}", e),
            CliError::Incomplete {
                failed,
                move_failed,
            } => write!(
                f,
                "{} file(s) failed to download, {} failed to move into place",
                failed, move_failed
            ),
            CliError::Interrupted => write!(f, "Interrupted"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Setup(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PatchfetchError> for CliError {
    fn from(err: PatchfetchError) -> Self {
        match err {
            PatchfetchError::InvalidConfig(msg) => CliError::Config(msg),
            other => CliError::Setup(other),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err.to_string())
    }
}
