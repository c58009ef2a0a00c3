//! Fetch command - download files from the configured mirrors.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use patchfetch::config::ConfigFile;
use patchfetch::{DownloadEvent, DownloadManager, RemoteFileId};
use tracing::warn;

use super::common::{load_config, read_manifest, source_entries_from_flags};
use crate::error::CliError;

/// How often the wait loop checks for Ctrl+C.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Arguments for the fetch command.
#[derive(Debug, Default)]
pub struct FetchArgs {
    pub config: Option<PathBuf>,
    pub target: Option<PathBuf>,
    pub temp: Option<PathBuf>,
    pub sources: Vec<String>,
    pub attempts: Option<u32>,
    pub workers: Option<usize>,
    pub manifest: Option<PathBuf>,
    pub files: Vec<String>,
}

/// Outcome counts for one run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub finished: usize,
    pub failed: Vec<RemoteFileId>,
    pub move_failed: Vec<RemoteFileId>,
    pub skipped: usize,
    pub interrupted: bool,
}

/// Run the fetch command.
pub fn run(args: FetchArgs) -> Result<(), CliError> {
    let (config, files) = prepare(args)?;
    let manager_config = config.to_manager_config()?;
    let sources = config.build_sources()?;

    println!("patchfetch v{}", patchfetch::VERSION);
    println!("=================");
    println!();
    println!("Target:  {}", manager_config.target_dir.display());
    println!("Staging: {}", manager_config.temp_dir.display());
    for entry in &config.sources {
        println!(
            "Source:  {} ({})",
            entry.name,
            entry.location.to_config_string()
        );
    }
    println!();

    let manager = DownloadManager::new(manager_config)?;
    for source in sources {
        manager.add_source(source);
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to set signal handler, Ctrl+C will not stop cleanly");
    }

    let summary = download(&manager, &files, &shutdown);
    manager.dispose();

    print_summary(&summary);

    if summary.interrupted {
        return Err(CliError::Interrupted);
    }
    if !summary.failed.is_empty() || !summary.move_failed.is_empty() {
        return Err(CliError::Incomplete {
            failed: summary.failed.len(),
            move_failed: summary.move_failed.len(),
        });
    }
    Ok(())
}

/// Apply CLI overrides to the config and collect the files to fetch.
pub fn prepare(args: FetchArgs) -> Result<(ConfigFile, Vec<String>), CliError> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(target) = args.target {
        config.paths.target_dir = Some(target);
    }
    if let Some(temp) = args.temp {
        config.paths.temp_dir = Some(temp);
    }
    if let Some(attempts) = args.attempts {
        config.download.attempts_per_source = attempts;
    }
    if let Some(workers) = args.workers {
        config.download.workers = workers;
    }
    config
        .sources
        .extend(source_entries_from_flags(&args.sources));

    if config.sources.is_empty() {
        return Err(CliError::Config(
            "no sources configured. Add entries under [sources] or use --source".to_string(),
        ));
    }

    let mut files = args.files;
    if let Some(manifest) = &args.manifest {
        files.extend(read_manifest(manifest)?);
    }
    if files.is_empty() {
        return Err(CliError::Arguments(
            "no files to download. Pass paths or --manifest".to_string(),
        ));
    }

    Ok((config, files))
}

/// Queue `files` and wait until each has an outcome or `shutdown` is set.
pub fn download(manager: &DownloadManager, files: &[String], shutdown: &AtomicBool) -> FetchSummary {
    let events = manager.subscribe_channel();
    let mut summary = FetchSummary::default();

    let mut queued = 0usize;
    for file in files {
        if manager.enqueue(file.as_str()) {
            queued += 1;
        } else {
            warn!(remote = %file, "Skipping invalid or duplicate path");
            summary.skipped += 1;
        }
    }

    let bar = progress_bar(queued as u64);
    let mut outcomes = 0usize;

    while outcomes < queued {
        if shutdown.load(Ordering::SeqCst) {
            summary.interrupted = true;
            break;
        }
        let event = match events.recv_timeout(POLL_INTERVAL) {
            Ok(event) => event,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };

        outcomes += 1;
        bar.inc(1);
        match event {
            DownloadEvent::DownloadFinished { remote, .. } => {
                summary.finished += 1;
                bar.set_message(remote.to_string());
            }
            DownloadEvent::DownloadFailed { remote } => {
                bar.println(format!("  failed: {}", remote));
                summary.failed.push(remote);
            }
            DownloadEvent::FileMoveFailed { remote, reason, .. } => {
                bar.println(format!("  could not move {}: {}", remote, reason));
                summary.move_failed.push(remote);
            }
        }
    }

    if summary.interrupted {
        bar.abandon_with_message("interrupted");
    } else {
        bar.finish_with_message("done");
    }
    summary
}

fn progress_bar(len: u64) -> ProgressBar {
    let bar = ProgressBar::new(len);
    let style = ProgressStyle::with_template(
        "  {spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} | {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▓░");
    bar.set_style(style);
    bar.enable_steady_tick(POLL_INTERVAL);
    bar
}

fn print_summary(summary: &FetchSummary) {
    println!();
    println!("Summary");
    println!("───────");
    println!("  Finished:       {}", summary.finished);
    println!("  Failed:         {}", summary.failed.len());
    println!("  Move failed:    {}", summary.move_failed.len());
    if summary.skipped > 0 {
        println!("  Skipped:        {}", summary.skipped);
    }
    if summary.interrupted {
        println!();
        println!("Interrupted, remaining files were not downloaded.");
    }
}
