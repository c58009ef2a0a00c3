//! HTTP mirror download source.
//!
//! Fetches `{base_url}/{remote id}` with a blocking reqwest client and
//! streams the body into the staging path. Each accepted download runs on
//! its own thread, so `try_begin_download` returns immediately.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::Url;
use tracing::{debug, warn};

use super::error::SourceError;
use super::slots::SourceSlots;
use super::{DownloadJob, DownloadSource};
use crate::error::{PatchfetchError, PatchfetchResult};
use crate::manager::RemoteFileId;

/// Default timeout for a whole download.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(300); // 5 minutes

/// Buffer size for reading/writing during downloads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Download source backed by an HTTP(S) mirror.
#[derive(Debug)]
pub struct HttpSource {
    name: String,
    base_url: Url,
    client: Client,
    timeout: Duration,
    slots: SourceSlots,
}

impl HttpSource {
    /// Create a source for `base_url` running one download at a time.
    pub fn new(name: impl Into<String>, base_url: &str) -> PatchfetchResult<Self> {
        Self::with_settings(name, base_url, DEFAULT_HTTP_TIMEOUT, 1)
    }

    /// Create a source with a custom timeout and number of concurrent downloads.
    pub fn with_settings(
        name: impl Into<String>,
        base_url: &str,
        timeout: Duration,
        concurrency: usize,
    ) -> PatchfetchResult<Self> {
        let mut normalized = base_url.trim().to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base_url = Url::parse(&normalized).map_err(|e| PatchfetchError::InvalidSourceUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(PatchfetchError::InvalidSourceUrl {
                url: base_url.to_string(),
                reason: format!("unsupported scheme {}", base_url.scheme()),
            });
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PatchfetchError::HttpClient(e.to_string()))?;

        Ok(Self {
            name: name.into(),
            base_url,
            client,
            timeout,
            slots: SourceSlots::new(concurrency),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Downloads currently running.
    pub fn active_downloads(&self) -> usize {
        self.slots.in_use()
    }

    /// URL of `remote` on this mirror.
    pub fn url_for(&self, remote: &RemoteFileId) -> Result<Url, SourceError> {
        let relative = remote
            .components()
            .map(escape_component)
            .collect::<Vec<_>>()
            .join("/");
        self.base_url
            .join(&relative)
            .map_err(|e| SourceError::Url {
                remote: remote.to_string(),
                reason: e.to_string(),
            })
    }
}

impl DownloadSource for HttpSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_begin_download(&self, job: DownloadJob) -> Result<(), DownloadJob> {
        let Some(slot) = self.slots.try_acquire() else {
            return Err(job);
        };

        let url = match self.url_for(job.remote()) {
            Ok(url) => url,
            Err(e) => {
                drop(slot);
                job.fail(e.to_string());
                return Ok(());
            }
        };

        let client = self.client.clone();
        let timeout = self.timeout;
        let source_name = self.name.clone();

        // If the thread cannot be spawned the closure is dropped with the job
        // inside it, which reports the attempt as failed.
        let spawned = thread::Builder::new()
            .name(format!("{}-http", self.name))
            .spawn(move || {
                let result = fetch(&client, &url, job.staging_path(), timeout);
                drop(slot);
                match result {
                    Ok(bytes) => {
                        debug!(source = %source_name, remote = %job.remote(), bytes, "HTTP download complete");
                        job.complete();
                    }
                    Err(e) => {
                        debug!(source = %source_name, remote = %job.remote(), error = %e, "HTTP download failed");
                        job.fail(e.to_string());
                    }
                }
            });
        if let Err(e) = spawned {
            warn!(source = %self.name, error = %e, "Failed to spawn download thread");
        }
        Ok(())
    }
}

/// Percent-encode the characters `Url::join` would otherwise treat as syntax.
fn escape_component(component: &str) -> String {
    let mut escaped = String::with_capacity(component.len());
    for c in component.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '?' => escaped.push_str("%3F"),
            '#' => escaped.push_str("%23"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Stream `url` into `dest`, returning the number of bytes written.
fn fetch(client: &Client, url: &Url, dest: &Path, timeout: Duration) -> Result<u64, SourceError> {
    let mut response = client.get(url.clone()).send().map_err(|e| {
        if e.is_timeout() {
            SourceError::Timeout {
                url: url.to_string(),
                timeout_secs: timeout.as_secs(),
            }
        } else {
            SourceError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let file = File::create(dest).map_err(|e| SourceError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;
    let mut writer = BufWriter::new(file);
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut downloaded = 0u64;

    loop {
        let bytes_read = response
            .read(&mut buffer)
            .map_err(|e| SourceError::Request {
                url: url.to_string(),
                reason: format!("read error: {}", e),
            })?;

        if bytes_read == 0 {
            break;
        }

        writer
            .write_all(&buffer[..bytes_read])
            .map_err(|e| SourceError::Write {
                path: dest.to_path_buf(),
                source: e,
            })?;

        downloaded += bytes_read as u64;
    }

    writer.flush().map_err(|e| SourceError::Write {
        path: dest.to_path_buf(),
        source: e,
    })?;

    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::job::tests::{RecordingSink, Report};
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::sync::{mpsc, Arc};
    use std::time::Instant;

    /// Serve one canned HTTP response per connection, optionally waiting
    /// for a signal before answering.
    fn serve(
        responses: Vec<(u16, &'static str)>,
        gate: Option<mpsc::Receiver<()>>,
    ) -> (String, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let mut paths = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                paths.push(
                    request_line
                        .split_whitespace()
                        .nth(1)
                        .unwrap_or_default()
                        .to_string(),
                );
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    if line == "\r\n" || line.is_empty() {
                        break;
                    }
                }
                if let Some(gate) = gate.as_ref() {
                    gate.recv().ok();
                }
                let reply = format!(
                    "HTTP/1.1 {} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                stream.write_all(reply.as_bytes()).unwrap();
            }
            paths
        });
        (format!("http://{}/patch", addr), handle)
    }

    fn wait_for_reports(sink: &RecordingSink, count: usize) -> Vec<Report> {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let reports = sink.reports.lock().clone();
            if reports.len() >= count || Instant::now() > deadline {
                return reports;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_rejects_non_http_scheme() {
        assert!(HttpSource::new("ftp", "ftp://example.com/").is_err());
        assert!(HttpSource::new("junk", "not a url").is_err());
    }

    #[test]
    fn test_url_for_normalises_base_and_separators() {
        let source = HttpSource::new("mirror", "https://example.com/patch").unwrap();
        let remote = RemoteFileId::new("Data\\Maps\\town 1.map").unwrap();
        assert_eq!(
            source.url_for(&remote).unwrap().as_str(),
            "https://example.com/patch/Data/Maps/town%201.map"
        );
    }

    #[test]
    fn test_url_for_escapes_query_characters() {
        let source = HttpSource::new("mirror", "https://example.com/").unwrap();
        let remote = RemoteFileId::new("odd?name#1.txt").unwrap();
        assert_eq!(
            source.url_for(&remote).unwrap().as_str(),
            "https://example.com/odd%3Fname%231.txt"
        );
    }

    #[test]
    fn test_with_settings() {
        let source =
            HttpSource::with_settings("mirror", "http://example.com", Duration::from_secs(5), 0)
                .unwrap();
        assert_eq!(source.timeout(), Duration::from_secs(5));
        assert_eq!(source.base_url().as_str(), "http://example.com/");
        assert_eq!(source.active_downloads(), 0);
    }

    #[test]
    fn test_downloads_into_staging_path() {
        let dir = tempfile::tempdir().unwrap();
        let (base, server) = serve(vec![(200, "hello patch")], None);
        let source = HttpSource::new("local", &base).unwrap();
        let sink = Arc::new(RecordingSink::default());
        let staging = dir.path().join("a.bin");

        assert!(source
            .try_begin_download(sink.job("Data/a.bin", staging.clone()))
            .is_ok());

        let reports = wait_for_reports(&sink, 1);
        assert!(matches!(reports[0], Report::Finished(..)));
        assert_eq!(std::fs::read_to_string(&staging).unwrap(), "hello patch");
        assert_eq!(server.join().unwrap(), vec!["/patch/Data/a.bin".to_string()]);
    }

    #[test]
    fn test_error_status_fails_job() {
        let dir = tempfile::tempdir().unwrap();
        let (base, server) = serve(vec![(404, "missing")], None);
        let source = HttpSource::new("local", &base).unwrap();
        let sink = Arc::new(RecordingSink::default());

        source
            .try_begin_download(sink.job("a.bin", dir.path().join("a.bin")))
            .unwrap();

        let reports = wait_for_reports(&sink, 1);
        assert!(matches!(&reports[0], Report::Failed(_, _, reason) if reason.contains("404")));
        assert!(!dir.path().join("a.bin").exists());
        server.join().unwrap();
    }

    #[test]
    fn test_busy_while_slot_taken() {
        let dir = tempfile::tempdir().unwrap();
        let (release, gate) = mpsc::channel();
        let (base, server) = serve(vec![(200, "slow")], Some(gate));
        let source = HttpSource::new("local", &base).unwrap();
        let sink = Arc::new(RecordingSink::default());

        source
            .try_begin_download(sink.job("a.bin", dir.path().join("a.bin")))
            .unwrap();
        let second = source.try_begin_download(sink.job("b.bin", dir.path().join("b.bin")));

        let returned = second.expect_err("source should be busy");
        assert_eq!(returned.remote().as_str(), "b.bin");
        assert_eq!(source.active_downloads(), 1);

        returned.disarm();
        release.send(()).unwrap();
        let reports = wait_for_reports(&sink, 1);
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0], Report::Finished(..)));
        server.join().unwrap();
    }
}
