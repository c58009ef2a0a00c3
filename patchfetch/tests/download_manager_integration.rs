//! Integration tests for the Download Manager.
//!
//! These tests drive the manager through its public API only:
//! - directory mirrors feeding a target tree
//! - failover from a broken mirror to a working one
//! - many concurrent producers
//! - dropping the manager
//!
//! Run with: `cargo test --test download_manager_integration`

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use patchfetch::{
    DirectorySource, DownloadEvent, DownloadJob, DownloadManager, DownloadManagerConfig,
    DownloadSource, RemoteFileId,
};
use tempfile::TempDir;

// ============================================================================
// Helper Functions
// ============================================================================

/// Files present on the "mirror" used by most tests.
const PATCH_FILES: &[&str] = &[
    "client.exe",
    "Data/Maps/1.map",
    "Data/Maps/2.map",
    "Data\\Sounds\\theme.ogg",
    "Data/Items/weapons.dat",
];

struct Setup {
    mirror: TempDir,
    target: TempDir,
    temp: TempDir,
}

impl Setup {
    fn new() -> Self {
        let setup = Self {
            mirror: tempfile::tempdir().unwrap(),
            target: tempfile::tempdir().unwrap(),
            temp: tempfile::tempdir().unwrap(),
        };
        for file in PATCH_FILES {
            let id = RemoteFileId::new(*file).unwrap();
            let path = id.join_onto(setup.mirror.path());
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, format!("contents of {}", id)).unwrap();
        }
        setup
    }

    fn config(&self) -> DownloadManagerConfig {
        DownloadManagerConfig::new(self.target.path(), self.temp.path())
            .with_idle_interval(Duration::from_millis(10))
            .with_busy_retry_interval(Duration::from_millis(10))
    }
}

/// Collect events until `count` have arrived or the deadline passes.
fn collect_events(rx: &mpsc::Receiver<DownloadEvent>, count: usize) -> Vec<DownloadEvent> {
    let deadline = Instant::now() + Duration::from_secs(20);
    let mut events = Vec::with_capacity(count);
    while events.len() < count {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(event) => events.push(event),
            Err(_) => break,
        }
    }
    events
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}

/// Completes every job immediately with a fixed payload.
#[derive(Default)]
struct InstantMirror {
    calls: AtomicUsize,
}

impl DownloadSource for InstantMirror {
    fn name(&self) -> &str {
        "instant"
    }

    fn try_begin_download(&self, job: DownloadJob) -> Result<(), DownloadJob> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match fs::write(job.staging_path(), b"payload") {
            Ok(()) => job.complete(),
            Err(e) => job.fail(e.to_string()),
        }
        Ok(())
    }
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Every file on a directory mirror ends up in the target tree.
#[test]
fn test_directory_mirror_populates_target() {
    let setup = Setup::new();
    let manager = DownloadManager::new(setup.config()).unwrap();
    let events = manager.subscribe_channel();
    manager.add_source(Arc::new(DirectorySource::with_concurrency(
        "disk",
        setup.mirror.path(),
        2,
    )));

    manager.enqueue_all(PATCH_FILES.iter().copied());

    let received = collect_events(&events, PATCH_FILES.len());
    assert_eq!(received.len(), PATCH_FILES.len());
    for event in &received {
        match event {
            DownloadEvent::DownloadFinished { remote, target } => {
                assert_eq!(*target, remote.join_onto(setup.target.path()));
                assert_eq!(read(target), format!("contents of {}", remote));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
    assert_eq!(manager.finished_count(), PATCH_FILES.len());
    assert!(manager.is_idle());
}

/// A file missing from the first mirror is eventually served by the second.
#[test]
fn test_failover_to_second_mirror() {
    let setup = Setup::new();
    let empty_mirror = tempfile::tempdir().unwrap();
    let manager = DownloadManager::new(
        setup
            .config()
            .with_source_selection(patchfetch::SourceSelection::AvoidRecentFailures),
    )
    .unwrap();
    let events = manager.subscribe_channel();
    manager.add_source(Arc::new(DirectorySource::new("empty", empty_mirror.path())));
    manager.add_source(Arc::new(DirectorySource::new("full", setup.mirror.path())));

    manager.enqueue("client.exe");

    let received = collect_events(&events, 1);
    assert!(
        matches!(received.as_slice(), [DownloadEvent::DownloadFinished { .. }]),
        "{:?}",
        received
    );
    assert_eq!(
        read(&setup.target.path().join("client.exe")),
        "contents of client.exe"
    );
    // Success clears the attempt history.
    assert_eq!(manager.failure_count(&RemoteFileId::new("client.exe").unwrap()), 0);
}

/// A file no mirror has fails once and lands in the failed list.
#[test]
fn test_missing_everywhere_fails_once() {
    let setup = Setup::new();
    let manager =
        DownloadManager::new(setup.config().with_attempts_per_source(2)).unwrap();
    let events = manager.subscribe_channel();
    manager.add_source(Arc::new(DirectorySource::new("a", setup.mirror.path())));
    manager.add_source(Arc::new(DirectorySource::new("b", setup.mirror.path())));
    assert_eq!(manager.max_attempts(), 4);

    manager.enqueue("Data/Maps/404.map");

    let received = collect_events(&events, 1);
    assert_eq!(
        received,
        vec![DownloadEvent::DownloadFailed {
            remote: RemoteFileId::new("Data/Maps/404.map").unwrap()
        }]
    );
    assert!(events.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(manager.failed_count(), 1);
    assert!(!setup.target.path().join("Data/Maps/404.map").exists());
}

/// Enqueueing from many threads at once loses nothing and duplicates nothing.
#[test]
fn test_concurrent_enqueue_from_many_threads() {
    const FILES: usize = 1000;
    const PRODUCERS: usize = 8;

    let setup = Setup::new();
    let manager = Arc::new(DownloadManager::new(setup.config()).unwrap());
    let events = manager.subscribe_channel();
    let mirror_a = Arc::new(InstantMirror::default());
    let mirror_b = Arc::new(InstantMirror::default());
    manager.add_source(Arc::clone(&mirror_a) as Arc<dyn DownloadSource>);
    manager.add_source(Arc::clone(&mirror_b) as Arc<dyn DownloadSource>);

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                for i in (p..FILES).step_by(PRODUCERS) {
                    assert!(manager.enqueue(format!("bulk/{:04}.bin", i)));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    let received = collect_events(&events, FILES);
    assert_eq!(received.len(), FILES);

    let unique: HashSet<RemoteFileId> = received
        .iter()
        .map(|event| {
            assert!(matches!(event, DownloadEvent::DownloadFinished { .. }));
            event.remote().clone()
        })
        .collect();
    assert_eq!(unique.len(), FILES);
    assert_eq!(manager.finished_count(), FILES);
    assert_eq!(
        mirror_a.calls.load(Ordering::SeqCst) + mirror_b.calls.load(Ordering::SeqCst),
        FILES
    );
}

/// Dropping the manager joins its workers and stops dispatching.
#[test]
fn test_drop_stops_workers() {
    let setup = Setup::new();
    let mirror = Arc::new(InstantMirror::default());
    {
        let manager = DownloadManager::new(setup.config()).unwrap();
        manager.add_source(Arc::clone(&mirror) as Arc<dyn DownloadSource>);
        manager.enqueue("client.exe");
        let deadline = Instant::now() + Duration::from_secs(5);
        while manager.finished_count() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    let calls = mirror.calls.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(mirror.calls.load(Ordering::SeqCst), calls);
    assert_eq!(calls, 1);
}

/// Event handlers see every outcome exactly once.
#[test]
fn test_handler_subscription_counts_events() {
    let setup = Setup::new();
    let manager = DownloadManager::new(setup.config()).unwrap();
    let finished = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&finished);
    manager.subscribe(move |event| {
        if let DownloadEvent::DownloadFinished { .. } = event {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    manager.add_source(Arc::new(DirectorySource::new("disk", setup.mirror.path())));

    manager.enqueue_all(PATCH_FILES.iter().copied());

    let deadline = Instant::now() + Duration::from_secs(10);
    while finished.load(Ordering::SeqCst) < PATCH_FILES.len() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(finished.load(Ordering::SeqCst), PATCH_FILES.len());
}
