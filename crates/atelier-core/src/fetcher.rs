//! Bounded concurrent fetcher.
//!
//! Downloads a batch of URLs to files with at most `max_in_flight_per_host`
//! requests outstanding against any single host. Every task yields exactly one
//! [`FetchOutcome`]; individual failures are collected into the
//! [`BatchReport`] instead of aborting the batch.
//!
//! Scheduling: one tokio task per download, each gated by a semaphore shared
//! with the other tasks for the same host. The calling task drains a
//! `JoinSet`, so outcomes are recorded in completion order and only the
//! coordinator touches the report. Dropping the batch future aborts every
//! download still queued or in flight.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

use crate::error::{BatchError, FetchError, FetchResult};
use crate::report::{BatchReport, FetchOutcome, FetchedFile};
use crate::task::DownloadTask;
use crate::transport::Transport;

/// Fetcher limits.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Maximum simultaneous requests against one host
    pub max_in_flight_per_host: usize,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_in_flight_per_host: 30,
            timeout_ms: 60_000,
        }
    }
}

impl FetchOptions {
    /// Check batch preconditions.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.max_in_flight_per_host == 0 {
            return Err(BatchError::InvalidConcurrency(self.max_in_flight_per_host));
        }
        if self.max_in_flight_per_host > Semaphore::MAX_PERMITS {
            return Err(BatchError::ConcurrencyTooLarge {
                limit: self.max_in_flight_per_host,
                max: Semaphore::MAX_PERMITS,
            });
        }
        if self.timeout_ms == 0 {
            return Err(BatchError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Downloads batches of tasks through a pluggable [`Transport`].
///
/// Holds no per-batch state; one instance can run any number of batches.
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    options: FetchOptions,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, options: FetchOptions) -> Self {
        Self { transport, options }
    }

    /// Download every task and return the failure report.
    ///
    /// Only invalid options are an error; per-task failures land in the report.
    pub async fn fetch_all(&self, tasks: Vec<DownloadTask>) -> Result<BatchReport, BatchError> {
        self.fetch_all_with(tasks, |_| {}).await
    }

    /// Like [`fetch_all`](Self::fetch_all), calling `on_outcome` as each task
    /// finishes (completion order).
    pub async fn fetch_all_with<F>(
        &self,
        tasks: Vec<DownloadTask>,
        mut on_outcome: F,
    ) -> Result<BatchReport, BatchError>
    where
        F: FnMut(&FetchOutcome),
    {
        self.options.validate()?;

        let mut report = BatchReport::new();
        if tasks.is_empty() {
            return Ok(report);
        }

        let total = tasks.len();
        let limit = self.options.max_in_flight_per_host;
        let timeout_ms = self.options.timeout_ms;
        let mut gates: HashMap<String, Arc<Semaphore>> = HashMap::new();
        let mut pending = JoinSet::new();
        let mut spawned: HashMap<tokio::task::Id, DownloadTask> = HashMap::new();

        tracing::info!(
            "Fetching {total} task(s) via {} (max {limit} in flight per host)",
            self.transport.name()
        );

        for task in tasks {
            // Rejected before any network call
            let url = match admit(&task) {
                Ok(url) => url,
                Err(error) => {
                    let outcome = FetchOutcome::failed(&task, error);
                    log_outcome(&outcome);
                    on_outcome(&outcome);
                    report.record(outcome);
                    continue;
                }
            };

            let gate = gates
                .entry(host_key(&url))
                .or_insert_with(|| Arc::new(Semaphore::new(limit)))
                .clone();
            let transport = self.transport.clone();
            let fallback = task.clone();

            // The permit is acquired inside the spawned task so a saturated
            // host never stalls scheduling for the others.
            let handle = pending.spawn(async move {
                let _permit = match gate.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return FetchOutcome::failed(
                            &task,
                            FetchError::Aborted("admission gate closed".to_string()),
                        );
                    }
                };
                fetch_one(transport.as_ref(), &task, &url, timeout_ms).await
            });
            spawned.insert(handle.id(), fallback);
        }

        tracing::debug!("{} host(s) in batch", gates.len());

        while let Some(joined) = pending.join_next_with_id().await {
            let outcome = match joined {
                Ok((id, outcome)) => {
                    spawned.remove(&id);
                    outcome
                }
                Err(e) => match spawned.remove(&e.id()) {
                    Some(task) => {
                        tracing::error!("Download task for {} panicked: {e}", task.id());
                        FetchOutcome::failed(&task, FetchError::Aborted(e.to_string()))
                    }
                    None => {
                        tracing::error!("Untracked download task failed: {e}");
                        continue;
                    }
                },
            };
            log_outcome(&outcome);
            on_outcome(&outcome);
            report.record(outcome);
        }

        debug_assert_eq!(report.total, total);
        tracing::info!(
            "Batch complete: {} succeeded, {} failed",
            report.succeeded,
            report.failed()
        );

        Ok(report)
    }
}

/// Validate a task's URL without touching the network.
fn admit(task: &DownloadTask) -> FetchResult<Url> {
    if !task.has_url() {
        return Err(FetchError::MissingUrl);
    }
    let url = Url::parse(task.url()).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(FetchError::InvalidUrl("URL has no host".to_string()));
    }
    Ok(url)
}

/// Key for the per-host admission gate.
fn host_key(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_ascii_lowercase()
}

/// Fetch one URL and write it to the task's destination.
async fn fetch_one(
    transport: &dyn Transport,
    task: &DownloadTask,
    url: &Url,
    timeout_ms: u64,
) -> FetchOutcome {
    tracing::debug!("GET {url} -> {:?}", task.destination());

    let response =
        match tokio::time::timeout(Duration::from_millis(timeout_ms), transport.get(url)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return FetchOutcome::failed(task, e),
            Err(_) => return FetchOutcome::failed(task, FetchError::Timeout { timeout_ms }),
        };

    if !response.is_success() {
        return FetchOutcome::failed(
            task,
            FetchError::HttpStatus {
                status: response.status,
            },
        );
    }

    match store(task.destination(), &response.body).await {
        Ok(bytes_written) => FetchOutcome::Succeeded(FetchedFile {
            id: task.id().to_string(),
            destination: task.destination().to_path_buf(),
            bytes_written,
        }),
        Err(e) => FetchOutcome::failed(task, e),
    }
}

fn log_outcome(outcome: &FetchOutcome) {
    match outcome {
        FetchOutcome::Succeeded(file) => {
            tracing::debug!(
                "Saved {} ({} bytes) to {:?}",
                file.id,
                file.bytes_written,
                file.destination
            );
        }
        FetchOutcome::Failed(failure) => {
            tracing::warn!("Failed {} [{}]: {}", failure.id, failure.url, failure.error);
        }
    }
}

/// Write `body` to `dest` via a temporary sibling file and rename.
///
/// A reader never observes a half-written `dest`.
async fn store(dest: &Path, body: &[u8]) -> FetchResult<u64> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FetchError::storage(parent, e))?;
    }

    let partial = PartialFile::beside(dest);
    let mut file = tokio::fs::File::create(partial.path())
        .await
        .map_err(|e| FetchError::storage(dest, e))?;
    file.write_all(body)
        .await
        .map_err(|e| FetchError::storage(dest, e))?;
    file.flush().await.map_err(|e| FetchError::storage(dest, e))?;
    drop(file);

    tokio::fs::rename(partial.path(), dest)
        .await
        .map_err(|e| FetchError::storage(dest, e))?;
    partial.persisted();

    Ok(body.len() as u64)
}

static PARTIAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// Temporary download file, removed on drop unless marked persisted.
///
/// Names are unique per write so duplicate tasks targeting the same
/// destination never share a temporary file. The name is never longer than
/// the destination's once that exceeds the unique suffix.
struct PartialFile {
    path: PathBuf,
    persisted: bool,
}

impl PartialFile {
    fn beside(dest: &Path) -> Self {
        let seq = PARTIAL_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string());
        let suffix = format!(".{:x}-{seq:x}.part", std::process::id());
        let stem = truncate_to(&name, name.len().saturating_sub(suffix.len() + 1));
        let path = dest.with_file_name(format!(".{stem}{suffix}"));
        Self {
            path,
            persisted: false,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn persisted(mut self) {
        self.persisted = true;
    }
}

/// Longest prefix of `s` that fits in `max_bytes` without splitting a char.
fn truncate_to(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::FailureKind;
    use crate::transport::TransportResponse;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;
    use std::time::Instant;

    type ResponseFn = Box<dyn Fn(&Url, u32) -> FetchResult<TransportResponse> + Send + Sync>;

    /// Per-host (current, max) in-flight counters.
    type HostCounters = Arc<Mutex<HashMap<String, (u32, u32)>>>;

    /// A configurable mock transport.
    ///
    /// `response_fn` receives the URL and how many times that URL has been
    /// requested before, so callers can fail the first attempt only.
    struct MockTransport {
        response_fn: ResponseFn,
        /// Every URL requested, in call order.
        calls: Arc<Mutex<Vec<String>>>,
        /// Delay applied before answering, keyed by URL path.
        delays: HashMap<String, Duration>,
        default_delay: Option<Duration>,
        per_host: HostCounters,
        in_flight: Arc<AtomicU32>,
        max_in_flight: Arc<AtomicU32>,
    }

    impl MockTransport {
        fn new(response_fn: ResponseFn) -> Self {
            Self {
                response_fn,
                calls: Arc::new(Mutex::new(Vec::new())),
                delays: HashMap::new(),
                default_delay: None,
                per_host: Arc::new(Mutex::new(HashMap::new())),
                in_flight: Arc::new(AtomicU32::new(0)),
                max_in_flight: Arc::new(AtomicU32::new(0)),
            }
        }

        fn body(body: &'static [u8]) -> Self {
            Self::new(Box::new(move |_, _| Ok(TransportResponse::ok(body))))
        }

        /// Body is the URL path, so each file's content is distinguishable.
        fn echo_path() -> Self {
            Self::new(Box::new(|url, _| {
                Ok(TransportResponse::ok(url.path().as_bytes().to_vec()))
            }))
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.default_delay = Some(delay);
            self
        }

        fn with_path_delay(mut self, path: &str, delay: Duration) -> Self {
            self.delays.insert(path.to_string(), delay);
            self
        }

        fn calls_handle(&self) -> Arc<Mutex<Vec<String>>> {
            self.calls.clone()
        }

        fn per_host_handle(&self) -> HostCounters {
            self.per_host.clone()
        }

        fn max_in_flight_handle(&self) -> Arc<AtomicU32> {
            self.max_in_flight.clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        fn name(&self) -> &str {
            "mock"
        }

        async fn get(&self, url: &Url) -> FetchResult<TransportResponse> {
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                let attempt = calls.iter().filter(|u| *u == url.as_str()).count() as u32;
                calls.push(url.to_string());
                attempt
            };
            let host = url.host_str().unwrap_or_default().to_string();
            {
                let mut per_host = self.per_host.lock().unwrap();
                let entry = per_host.entry(host.clone()).or_insert((0, 0));
                entry.0 += 1;
                entry.1 = entry.1.max(entry.0);
            }
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            let delay = self.delays.get(url.path()).copied().or(self.default_delay);
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let result = (self.response_fn)(url, attempt);

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if let Some(entry) = self.per_host.lock().unwrap().get_mut(&host) {
                entry.0 -= 1;
            }
            result
        }
    }

    fn task(dir: &Path, id: &str, url: &str) -> DownloadTask {
        DownloadTask::new(id, url, dir.join(format!("image_{id}.jpg")))
    }

    fn options(max_in_flight_per_host: usize) -> FetchOptions {
        FetchOptions {
            max_in_flight_per_host,
            timeout_ms: 5000,
        }
    }

    fn fetcher(transport: MockTransport, options: FetchOptions) -> Fetcher {
        Fetcher::new(Arc::new(transport), options)
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_fetch_writes_files() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = vec![
            task(dir.path(), "1", "https://cdn.shop.test/a.jpg"),
            task(dir.path(), "2", "https://cdn.shop.test/b.jpg"),
        ];
        let report = fetcher(MockTransport::echo_path(), options(4))
            .fetch_all(tasks)
            .await
            .unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.succeeded, 2);
        assert!(report.is_clean());
        assert_eq!(
            std::fs::read(dir.path().join("image_1.jpg")).unwrap(),
            b"/a.jpg"
        );
        assert_eq!(
            std::fs::read(dir.path().join("image_2.jpg")).unwrap(),
            b"/b.jpg"
        );
        assert_eq!(report.bytes_written, 12);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_batch_makes_no_calls() {
        let transport = MockTransport::body(b"x");
        let calls = transport.calls_handle();
        let report = fetcher(transport, options(2))
            .fetch_all(Vec::new())
            .await
            .unwrap();

        assert_eq!(report, BatchReport::new());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_url_fails_without_network_call() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::body(b"img");
        let calls = transport.calls_handle();
        let tasks = vec![
            task(dir.path(), "no-url", ""),
            task(dir.path(), "ok", "https://cdn.shop.test/ok.jpg"),
        ];
        let report = fetcher(transport, options(2))
            .fetch_all(tasks)
            .await
            .unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.id, "no-url");
        assert_eq!(failure.error, "no URL provided");
        assert_eq!(failure.kind, FailureKind::MissingInput);
        assert_eq!(failure.url, "");
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["https://cdn.shop.test/ok.jpg".to_string()]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_http_404_recorded_with_status() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new(Box::new(|url, _| {
            if url.path() == "/a.jpg" {
                Ok(TransportResponse::status(404))
            } else {
                Ok(TransportResponse::ok(b"b".to_vec()))
            }
        }));
        let tasks = vec![
            task(dir.path(), "A", "https://cdn.shop.test/a.jpg"),
            task(dir.path(), "B", "https://cdn.shop.test/b.jpg"),
        ];
        let report = fetcher(transport, options(2))
            .fetch_all(tasks)
            .await
            .unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(report.succeeded, 1);
        let failure = &report.failures[0];
        assert_eq!(failure.id, "A");
        assert_eq!(failure.kind, FailureKind::HttpStatus);
        assert!(failure.error.contains("404"), "Got: {}", failure.error);
        assert!(!dir.path().join("image_A.jpg").exists());
        assert!(dir.path().join("image_B.jpg").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_per_host_limit_bounds_concurrency() {
        let dir = tempfile::tempdir().unwrap();
        let delay = Duration::from_millis(100);
        let transport = MockTransport::body(b"img").with_delay(delay);
        let per_host = transport.per_host_handle();
        let tasks: Vec<_> = (0..5)
            .map(|i| {
                task(
                    dir.path(),
                    &i.to_string(),
                    &format!("https://cdn.shop.test/{i}.jpg"),
                )
            })
            .collect();

        let start = Instant::now();
        let report = fetcher(transport, options(2))
            .fetch_all(tasks)
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(report.succeeded, 5);
        let max = per_host.lock().unwrap()["cdn.shop.test"].1;
        assert!(max <= 2, "per-host limit violated: max concurrent was {max}");
        // 5 tasks, 2 at a time: at least three rounds of the mock delay
        assert!(elapsed >= delay * 3, "finished too fast: {elapsed:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_different_hosts_not_mutually_limited() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::body(b"img").with_delay(Duration::from_millis(200));
        let per_host = transport.per_host_handle();
        let max_in_flight = transport.max_in_flight_handle();
        let tasks = vec![
            task(dir.path(), "a1", "https://a.shop.test/1.jpg"),
            task(dir.path(), "a2", "https://a.shop.test/2.jpg"),
            task(dir.path(), "b1", "https://b.shop.test/1.jpg"),
            task(dir.path(), "b2", "https://b.shop.test/2.jpg"),
        ];
        let report = fetcher(transport, options(1))
            .fetch_all(tasks)
            .await
            .unwrap();

        assert_eq!(report.succeeded, 4);
        let per_host = per_host.lock().unwrap();
        assert_eq!(per_host["a.shop.test"].1, 1);
        assert_eq!(per_host["b.shop.test"].1, 1);
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rerun_overwrites_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = vec![
            task(dir.path(), "1", "https://cdn.shop.test/a.jpg"),
            task(dir.path(), "2", "https://cdn.shop.test/b.jpg"),
        ];

        let first = fetcher(MockTransport::body(b"first run"), options(2))
            .fetch_all(tasks.clone())
            .await
            .unwrap();
        assert!(first.is_clean());

        let second = fetcher(MockTransport::body(b"second"), options(2))
            .fetch_all(tasks)
            .await
            .unwrap();
        assert!(second.is_clean());
        assert_eq!(second.succeeded, 2);
        assert_eq!(
            std::fs::read(dir.path().join("image_1.jpg")).unwrap(),
            b"second"
        );
        assert_eq!(file_names(dir.path()), vec!["image_1.jpg", "image_2.jpg"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_timeout_fails_only_slow_task() {
        let dir = tempfile::tempdir().unwrap();
        let transport =
            MockTransport::body(b"img").with_path_delay("/slow.jpg", Duration::from_secs(5));
        let tasks = vec![
            task(dir.path(), "slow", "https://cdn.shop.test/slow.jpg"),
            task(dir.path(), "fast", "https://cdn.shop.test/fast.jpg"),
        ];
        let report = fetcher(
            transport,
            FetchOptions {
                max_in_flight_per_host: 2,
                timeout_ms: 100,
            },
        )
        .fetch_all(tasks)
        .await
        .unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.id, "slow");
        assert_eq!(failure.kind, FailureKind::Transport);
        assert!(failure.error.contains("timed out"), "Got: {}", failure.error);
        assert!(dir.path().join("image_fast.jpg").exists());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_transport_error_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new(Box::new(|_, _| {
            Err(FetchError::Transport("connection reset by peer".to_string()))
        }));
        let tasks = vec![task(dir.path(), "1", "https://cdn.shop.test/a.jpg")];
        let report = fetcher(transport, options(2))
            .fetch_all(tasks)
            .await
            .unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].kind, FailureKind::Transport);
        assert!(report.failures[0].error.contains("connection reset"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_ids_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        // First request for the URL fails, the second succeeds
        let transport = MockTransport::new(Box::new(|_, attempt| {
            if attempt == 0 {
                Ok(TransportResponse::status(503))
            } else {
                Ok(TransportResponse::ok(b"img".to_vec()))
            }
        }));
        let calls = transport.calls_handle();
        let tasks = vec![
            task(dir.path(), "dup", "https://cdn.shop.test/dup.jpg"),
            task(dir.path(), "dup", "https://cdn.shop.test/dup.jpg"),
        ];
        let report = fetcher(transport, options(1))
            .fetch_all(tasks)
            .await
            .unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures.iter().filter(|f| f.id == "dup").count(), 1);
        assert_eq!(calls.lock().unwrap().len(), 2);
        assert_eq!(file_names(dir.path()), vec!["image_dup.jpg"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_destinations_written_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::body(b"same").with_delay(Duration::from_millis(20));
        let tasks: Vec<_> = (0..4)
            .map(|_| task(dir.path(), "dup", "https://cdn.shop.test/dup.jpg"))
            .collect();
        let report = fetcher(transport, options(4))
            .fetch_all(tasks)
            .await
            .unwrap();

        assert_eq!(report.succeeded, 4);
        assert_eq!(file_names(dir.path()), vec!["image_dup.jpg"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_write_failure_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the output directory should be
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, b"").unwrap();
        let tasks = vec![
            task(&blocker, "1", "https://cdn.shop.test/a.jpg"),
            task(dir.path(), "2", "https://cdn.shop.test/b.jpg"),
        ];
        let report = fetcher(MockTransport::body(b"img"), options(2))
            .fetch_all(tasks)
            .await
            .unwrap();

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.failures[0].id, "1");
        assert_eq!(report.failures[0].kind, FailureKind::Storage);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_url_never_reaches_transport() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::body(b"img");
        let calls = transport.calls_handle();
        let tasks = vec![
            task(dir.path(), "rel", "not a url"),
            task(dir.path(), "ftp", "ftp://files.shop.test/a.jpg"),
        ];
        let report = fetcher(transport, options(2))
            .fetch_all(tasks)
            .await
            .unwrap();

        assert_eq!(report.failed(), 2);
        assert!(report
            .failures
            .iter()
            .all(|f| f.kind == FailureKind::Transport && f.error.starts_with("invalid URL")));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_zero_limit_rejected_before_work() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::body(b"img");
        let calls = transport.calls_handle();
        let tasks = vec![task(dir.path(), "1", "https://cdn.shop.test/a.jpg")];
        let err = fetcher(transport, options(0))
            .fetch_all(tasks)
            .await
            .unwrap_err();

        assert_eq!(err, BatchError::InvalidConcurrency(0));
        assert!(calls.lock().unwrap().is_empty());
        assert!(file_names(dir.path()).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_oversized_limit_rejected_before_work() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::body(b"img");
        let calls = transport.calls_handle();
        let tasks = vec![task(dir.path(), "1", "https://cdn.shop.test/a.jpg")];
        let err = fetcher(transport, options(usize::MAX))
            .fetch_all(tasks)
            .await
            .unwrap_err();

        assert_eq!(
            err,
            BatchError::ConcurrencyTooLarge {
                limit: usize::MAX,
                max: Semaphore::MAX_PERMITS,
            }
        );
        assert!(calls.lock().unwrap().is_empty());
        assert!(options(Semaphore::MAX_PERMITS).validate().is_ok());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_dropped_batch_aborts_remaining_downloads() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::body(b"img").with_delay(Duration::from_millis(200));
        let calls = transport.calls_handle();
        let tasks = vec![
            task(dir.path(), "1", "https://cdn.shop.test/1.jpg"),
            task(dir.path(), "2", "https://cdn.shop.test/2.jpg"),
            task(dir.path(), "3", "https://cdn.shop.test/3.jpg"),
        ];
        let fetcher = fetcher(transport, options(1));

        let cancelled =
            tokio::time::timeout(Duration::from_millis(50), fetcher.fetch_all(tasks)).await;
        assert!(cancelled.is_err());

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert!(calls.lock().unwrap().len() <= 1);
        assert!(file_names(dir.path()).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_longest_file_name_is_writable() {
        let dir = tempfile::tempdir().unwrap();
        // image_<id>.jpg is exactly 255 bytes, the usual NAME_MAX
        let id = "x".repeat(245);
        let tasks = vec![task(dir.path(), &id, "https://cdn.shop.test/long.jpg")];
        let report = fetcher(MockTransport::body(b"img"), options(1))
            .fetch_all(tasks)
            .await
            .unwrap();

        assert!(report.is_clean(), "{:?}", report.failures);
        assert_eq!(file_names(dir.path()), vec![format!("image_{id}.jpg")]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_every_task_reports_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new(Box::new(|url, _| match url.path() {
            "/0.jpg" | "/3.jpg" => Ok(TransportResponse::status(500)),
            "/5.jpg" => Err(FetchError::Transport("dns error".to_string())),
            _ => Ok(TransportResponse::ok(b"img".to_vec())),
        }));
        let mut tasks: Vec<_> = (0..8)
            .map(|i| {
                task(
                    dir.path(),
                    &i.to_string(),
                    &format!("https://cdn.shop.test/{i}.jpg"),
                )
            })
            .collect();
        tasks.push(task(dir.path(), "missing", ""));

        let mut seen = Vec::new();
        let report = fetcher(transport, options(3))
            .fetch_all_with(tasks, |outcome| seen.push(outcome.id().to_string()))
            .await
            .unwrap();

        assert_eq!(report.total, 9);
        assert_eq!(report.succeeded + report.failed(), 9);
        assert_eq!(report.failed(), 4);
        seen.sort();
        let mut expected: Vec<String> = (0..8).map(|i| i.to_string()).collect();
        expected.push("missing".to_string());
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_no_partial_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let transport = MockTransport::new(Box::new(|url, _| {
            if url.path() == "/bad.jpg" {
                Ok(TransportResponse::status(404))
            } else {
                Ok(TransportResponse::ok(vec![7u8; 4096]))
            }
        }));
        let tasks = vec![
            task(dir.path(), "good", "https://cdn.shop.test/good.jpg"),
            task(dir.path(), "bad", "https://cdn.shop.test/bad.jpg"),
        ];
        fetcher(transport, options(2))
            .fetch_all(tasks)
            .await
            .unwrap();

        assert_eq!(file_names(dir.path()), vec!["image_good.jpg"]);
    }

    #[test]
    fn test_partial_file_removed_unless_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("image_1.jpg");

        let abandoned = PartialFile::beside(&dest);
        std::fs::write(abandoned.path(), b"half").unwrap();
        let abandoned_path = abandoned.path().to_path_buf();
        drop(abandoned);
        assert!(!abandoned_path.exists());

        let kept = PartialFile::beside(&dest);
        std::fs::write(kept.path(), b"whole").unwrap();
        let kept_path = kept.path().to_path_buf();
        kept.persisted();
        assert!(kept_path.exists());
    }

    #[test]
    fn test_partial_names_are_unique() {
        let dest = Path::new("/out/image_1.jpg");
        let a = PartialFile::beside(dest);
        let b = PartialFile::beside(dest);
        assert_ne!(a.path(), b.path());
        assert_eq!(a.path().parent(), dest.parent());
        a.persisted();
        b.persisted();
    }

    #[test]
    fn test_partial_name_never_longer_than_long_destination() {
        let name = format!("image_{}.jpg", "é".repeat(120));
        let dest = PathBuf::from("/out").join(&name);
        let partial = PartialFile::beside(&dest);
        let partial_name = partial.path().file_name().unwrap().to_str().unwrap().to_string();
        partial.persisted();

        assert!(partial_name.len() <= name.len());
        assert!(partial_name.starts_with(".image_"));
        assert!(partial_name.ends_with(".part"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_to("abc", 10), "abc");
        assert_eq!(truncate_to("abcdef", 3), "abc");
        assert_eq!(truncate_to("aé", 2), "a");
        assert_eq!(truncate_to("abc", 0), "");
    }

    #[test]
    fn test_admit_rules() {
        let dest = PathBuf::from("x");
        assert_eq!(
            admit(&DownloadTask::new("1", "", dest.clone())).unwrap_err(),
            FetchError::MissingUrl
        );
        assert!(matches!(
            admit(&DownloadTask::new("2", "mailto:a@b.c", dest.clone())),
            Err(FetchError::InvalidUrl(_))
        ));
        let url = admit(&DownloadTask::new("3", "https://CDN.Shop.test/a.jpg", dest)).unwrap();
        assert_eq!(host_key(&url), "cdn.shop.test");
    }

    #[test]
    fn test_options_validate() {
        assert!(FetchOptions::default().validate().is_ok());
        let zero_timeout = FetchOptions {
            timeout_ms: 0,
            ..FetchOptions::default()
        };
        assert_eq!(zero_timeout.validate(), Err(BatchError::InvalidTimeout));
    }
}
