//! patchfetch CLI - download patch files from a pool of mirrors.

mod commands;
mod error;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use patchfetch::logging::{self, LogConfig};

use commands::fetch::FetchArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "patchfetch", version, about = "Download patch files from a pool of mirrors")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download files into the target directory
    Fetch {
        /// Configuration file (defaults to the platform config directory)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory finished files are moved into
        #[arg(long)]
        target: Option<PathBuf>,

        /// Staging directory for partial downloads
        #[arg(long)]
        temp: Option<PathBuf>,

        /// Mirror URL or directory (repeatable, tried after configured sources)
        #[arg(long = "source", value_name = "URL_OR_DIR")]
        sources: Vec<String>,

        /// Attempts each source adds to a file's retry budget
        #[arg(long)]
        attempts: Option<u32>,

        /// Number of worker threads
        #[arg(long)]
        workers: Option<usize>,

        /// File listing one remote path per line (`#` starts a comment)
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Remote file paths to download
        files: Vec<String>,
    },

    /// Write a default configuration file
    Init {
        /// Where to write the file (defaults to the platform config directory)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let directive = if cli.verbose { "debug" } else { "info" };
    let log_guard = match logging::init(LogConfig::default().with_default_directive(directive)) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: file logging disabled: {}", e);
            None
        }
    };

    let result = run(cli.command);

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        let code = e.exit_code();
        drop(log_guard);
        process::exit(code);
    }
}

fn run(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Fetch {
            config,
            target,
            temp,
            sources,
            attempts,
            workers,
            manifest,
            files,
        } => commands::fetch::run(FetchArgs {
            config,
            target,
            temp,
            sources,
            attempts,
            workers,
            manifest,
            files,
        }),
        Commands::Init { config, force } => commands::init::run(config, force),
    }
}
