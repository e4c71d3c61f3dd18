//! Bounded-concurrency PDF download orchestrator.
//!
//! Each paper becomes one task; a semaphore caps how many fetch at once.
//! Task failures are contained to their own result, so one bad paper never
//! aborts the batch. Cancellation is cooperative: tasks that have not yet
//! acquired a permit resolve as cancelled, in-flight transfers finish.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{ErrorKind, HarvestError};
use crate::hooks::{HookBus, HookContext};
use crate::models::{BatchReport, DownloadResult, DownloadTask, Paper};
use crate::transport::Transport;
use crate::utils::destination_candidates;

/// Hard upper bound on the concurrency setting
pub const MAX_CONCURRENCY: usize = 100;

/// Default number of simultaneous downloads
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Fetches the raw bytes of one artifact.
///
/// The orchestrator only needs this one operation, so tests can swap in a
/// scripted fetcher without any network.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, HarvestError>;
}

#[async_trait]
impl ArtifactFetcher for Transport {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, HarvestError> {
        self.get_bytes(url).await
    }
}

/// Concurrent downloader for batches of papers.
#[derive(Clone)]
pub struct Downloader {
    fetcher: Arc<dyn ArtifactFetcher>,
    hooks: Arc<HookBus>,
    concurrency: usize,
    cancel: CancellationToken,
}

impl Downloader {
    pub fn new(fetcher: Arc<dyn ArtifactFetcher>, concurrency: usize) -> Self {
        Self {
            fetcher,
            hooks: Arc::new(HookBus::new()),
            concurrency,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<HookBus>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Token that stops the batch when cancelled. Clone it and call
    /// `cancel()` from anywhere.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Download every paper into `target_dir`.
    ///
    /// Returns `Err` only for an invalid concurrency setting or an
    /// unusable target directory; per-paper failures land in the report.
    /// Results arrive in completion order, with the input position kept
    /// on each task.
    #[instrument(skip(self, papers), fields(papers = papers.len(), concurrency = self.concurrency))]
    pub async fn run(
        &self,
        papers: Vec<Paper>,
        target_dir: &Path,
    ) -> Result<BatchReport, HarvestError> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(HarvestError::Validation(format!(
                "concurrency must be in 1..={}, got {}",
                MAX_CONCURRENCY, self.concurrency
            )));
        }

        tokio::fs::create_dir_all(target_dir).await?;

        let started = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();

        for (index, paper) in papers.into_iter().enumerate() {
            let (primary, _) = destination_candidates(target_dir, &paper.title, &paper.id);
            let desired_filename = primary
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let task = DownloadTask {
                paper,
                target_dir: target_dir.to_path_buf(),
                desired_filename,
                index,
            };
            let fetcher = Arc::clone(&self.fetcher);
            let hooks = Arc::clone(&self.hooks);
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();

            set.spawn(async move {
                let task_started = Instant::now();

                let permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return DownloadResult::failed(
                            task,
                            ErrorKind::Cancelled,
                            task_started.elapsed(),
                        );
                    }
                    permit = semaphore.acquire_owned() => permit,
                };
                // Closed semaphore cannot happen while we hold an Arc to it
                let _permit = match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        return DownloadResult::failed(
                            task,
                            ErrorKind::Cancelled,
                            task_started.elapsed(),
                        );
                    }
                };

                let result = download_one(&*fetcher, &hooks, task, task_started).await;

                let mut ctx = HookContext::new();
                hooks
                    .dispatch_post_download(&result.task.paper, &result, &mut ctx)
                    .await;

                result
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "download task panicked"),
            }
        }

        let report = BatchReport::new(results, started.elapsed());
        info!(
            successful = report.successful,
            failed = report.failed,
            skipped = report.skipped,
            bytes = report.total_bytes(),
            "batch finished"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("concurrency", &self.concurrency)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

async fn download_one(
    fetcher: &dyn ArtifactFetcher,
    hooks: &HookBus,
    task: DownloadTask,
    started: Instant,
) -> DownloadResult {
    let mut ctx = HookContext::new();
    hooks
        .dispatch_pre_download(&task.paper, &task.target_dir, &mut ctx)
        .await;
    if let Some(reason) = ctx.abort_reason() {
        debug!(id = %task.paper.id, reason, "download vetoed");
        return DownloadResult::skipped(task, None, started.elapsed());
    }

    // Atomic check-and-reserve over the two candidate names: creating a
    // destination exclusively keeps two tasks resolving to the same name
    // from both fetching. Title name first, id-suffixed name second,
    // both taken means the paper is already on disk.
    let (primary, fallback) = destination_candidates(&task.target_dir, &task.paper.title, &task.paper.id);
    let mut destination = None;
    for candidate in [primary, fallback] {
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_reservation) => {
                destination = Some(candidate);
                break;
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                warn!(id = %task.paper.id, error = %e, "could not reserve destination");
                return DownloadResult::failed(task, ErrorKind::Filesystem, started.elapsed());
            }
        }
    }
    let destination = match destination {
        Some(destination) => destination,
        None => {
            debug!(id = %task.paper.id, "both candidate names taken, already on disk");
            let (_, existing) =
                destination_candidates(&task.target_dir, &task.paper.title, &task.paper.id);
            return DownloadResult::skipped(task, Some(existing), started.elapsed());
        }
    };

    match fetch_and_write(fetcher, &task.paper, &destination).await {
        Ok(bytes) => {
            debug!(id = %task.paper.id, bytes, path = %destination.display(), "downloaded");
            DownloadResult::success(task, destination, bytes, started.elapsed())
        }
        Err(e) => {
            // Drop the reservation and any partial file
            let _ = tokio::fs::remove_file(&destination).await;
            let _ = tokio::fs::remove_file(part_path(&destination)).await;
            warn!(id = %task.paper.id, error = %e, "download failed");
            DownloadResult::failed(task, e.kind(), started.elapsed())
        }
    }
}

/// Fetch the PDF and move it into place via a sibling partial file, so
/// the destination is either the reservation marker or a complete PDF.
async fn fetch_and_write(
    fetcher: &dyn ArtifactFetcher,
    paper: &Paper,
    destination: &Path,
) -> Result<u64, HarvestError> {
    let body = fetcher.fetch(&paper.pdf_url).await?;
    let bytes = body.len() as u64;

    let part = part_path(destination);
    let mut file = tokio::fs::File::create(&part).await?;
    file.write_all(&body).await?;
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&part, destination).await?;
    Ok(bytes)
}

fn part_path(destination: &Path) -> PathBuf {
    let mut os = destination.as_os_str().to_os_string();
    os.push(".part");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::Hook;
    use crate::models::PaperBuilder;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn paper(n: usize) -> Paper {
        PaperBuilder::new(
            format!("2301.0000{}v1", n),
            format!("Paper Number {}", n),
            format!("https://arxiv.org/pdf/2301.0000{}v1", n),
        )
        .build()
    }

    /// Scripted fetcher: URLs listed in `failures` error, everything else
    /// returns `body` after `delay`.
    struct ScriptedFetcher {
        body: Vec<u8>,
        failures: HashMap<String, HarvestError>,
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn ok(body: &[u8]) -> Self {
            Self {
                body: body.to_vec(),
                failures: HashMap::new(),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn failing_on(mut self, url: &str, error: HarvestError) -> Self {
            self.failures.insert(url.to_string(), error);
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl ArtifactFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, HarvestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.failures.get(url) {
                Some(e) => Err(clone_error(e)),
                None => Ok(self.body.clone()),
            }
        }
    }

    fn clone_error(e: &HarvestError) -> HarvestError {
        match e {
            HarvestError::Http { status, retry_after } => HarvestError::Http {
                status: *status,
                retry_after: *retry_after,
            },
            other => HarvestError::Network(other.to_string()),
        }
    }

    #[tokio::test]
    async fn test_batch_success() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::ok(b"%PDF-1.5 data"));
        let downloader = Downloader::new(Arc::clone(&fetcher) as Arc<dyn ArtifactFetcher>, 3);

        let report = downloader
            .run((0..4).map(paper).collect(), dir.path())
            .await
            .unwrap();

        assert_eq!(report.successful, 4);
        assert!(report.is_all_success());
        for result in &report.results {
            let path = result.path.as_ref().unwrap();
            assert_eq!(std::fs::read(path).unwrap(), b"%PDF-1.5 data");
            // No stray partial files
            assert!(!part_path(path).exists());
        }
    }

    #[tokio::test]
    async fn test_one_failure_does_not_poison_batch() {
        let dir = TempDir::new().unwrap();
        let fetcher = ScriptedFetcher::ok(b"pdf").failing_on(
            "https://arxiv.org/pdf/2301.00002v1",
            HarvestError::Http { status: 404, retry_after: None },
        );
        let downloader = Downloader::new(Arc::new(fetcher), 2);

        let report = downloader
            .run((0..5).map(paper).collect(), dir.path())
            .await
            .unwrap();

        assert_eq!(report.successful, 4);
        assert_eq!(report.failed, 1);
        let failed = report
            .results
            .iter()
            .find(|r| r.outcome == crate::models::DownloadOutcome::Failed)
            .unwrap();
        assert_eq!(failed.task.paper.id, "2301.00002v1");
        assert_eq!(failed.error, Some(ErrorKind::Network));
        // The failed paper left no file behind under either name
        let (primary, fallback) =
            destination_candidates(dir.path(), &failed.task.paper.title, &failed.task.paper.id);
        assert!(!primary.exists());
        assert!(!fallback.exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            ScriptedFetcher::ok(b"pdf").with_delay(Duration::from_millis(30)),
        );
        let downloader = Downloader::new(Arc::clone(&fetcher) as Arc<dyn ArtifactFetcher>, 2);

        let report = downloader
            .run((0..10).map(paper).collect(), dir.path())
            .await
            .unwrap();

        assert_eq!(report.successful, 10);
        assert!(fetcher.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_existing_files_skipped_without_fetch() {
        let dir = TempDir::new().unwrap();
        let p = paper(1);
        let (primary, fallback) = destination_candidates(dir.path(), &p.title, &p.id);
        std::fs::write(&primary, b"already here").unwrap();
        std::fs::write(&fallback, b"also here").unwrap();

        let fetcher = Arc::new(ScriptedFetcher::ok(b"new bytes"));
        let downloader = Downloader::new(Arc::clone(&fetcher) as Arc<dyn ArtifactFetcher>, 1);
        let report = downloader.run(vec![p], dir.path()).await.unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.results[0].path.as_deref(), Some(fallback.as_path()));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        // The existing files were not touched
        assert_eq!(std::fs::read(&primary).unwrap(), b"already here");
        assert_eq!(std::fs::read(&fallback).unwrap(), b"also here");
    }

    #[tokio::test]
    async fn test_title_collision_falls_back_to_id_suffix() {
        let dir = TempDir::new().unwrap();
        let a = PaperBuilder::new("2301.00001v1", "Shared Title", "https://arxiv.org/pdf/2301.00001v1")
            .build();
        let b = PaperBuilder::new("2301.00002v1", "Shared Title", "https://arxiv.org/pdf/2301.00002v1")
            .build();

        let fetcher = Arc::new(ScriptedFetcher::ok(b"pdf"));
        let downloader = Downloader::new(Arc::clone(&fetcher) as Arc<dyn ArtifactFetcher>, 2);
        let report = downloader.run(vec![a, b], dir.path()).await.unwrap();

        assert_eq!(report.successful, 2);
        let mut paths: Vec<_> = report
            .results
            .iter()
            .map(|r| r.path.clone().unwrap())
            .collect();
        paths.sort();
        paths.dedup();
        // Both papers landed, under distinct names
        assert_eq!(paths.len(), 2);
        assert!(dir.path().join("Shared_Title.pdf").exists());
    }

    #[tokio::test]
    async fn test_invalid_concurrency_rejected() {
        let fetcher: Arc<dyn ArtifactFetcher> = Arc::new(ScriptedFetcher::ok(b""));
        let dir = TempDir::new().unwrap();

        for bad in [0, MAX_CONCURRENCY + 1] {
            let downloader = Downloader::new(Arc::clone(&fetcher), bad);
            let result = downloader.run(vec![paper(0)], dir.path()).await;
            assert!(matches!(result, Err(HarvestError::Validation(_))));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancellation_spares_in_flight_task() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(
            ScriptedFetcher::ok(b"pdf").with_delay(Duration::from_millis(200)),
        );
        let downloader = Downloader::new(Arc::clone(&fetcher) as Arc<dyn ArtifactFetcher>, 1);

        let token = downloader.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });

        let report = downloader
            .run((0..3).map(paper).collect(), dir.path())
            .await
            .unwrap();

        // The task holding the permit finished; the queued ones resolved
        // as cancelled failures
        assert_eq!(report.successful, 1);
        assert_eq!(report.failed, 2);
        for result in report.results.iter().filter(|r| r.error.is_some()) {
            assert_eq!(result.error, Some(ErrorKind::Cancelled));
        }
    }

    struct VetoAll;

    #[async_trait]
    impl Hook for VetoAll {
        fn name(&self) -> &str {
            "veto_all"
        }

        async fn pre_download(
            &self,
            _paper: &Paper,
            _target_dir: &Path,
            ctx: &mut HookContext,
        ) -> Result<(), HarvestError> {
            ctx.abort("policy");
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_hook_veto_skips_without_fetch() {
        let dir = TempDir::new().unwrap();
        let fetcher = Arc::new(ScriptedFetcher::ok(b"pdf"));
        let mut hooks = HookBus::new();
        hooks.register(Arc::new(VetoAll), 0);

        let downloader = Downloader::new(Arc::clone(&fetcher) as Arc<dyn ArtifactFetcher>, 2)
            .with_hooks(Arc::new(hooks));
        let report = downloader
            .run(vec![paper(0), paper(1)], dir.path())
            .await
            .unwrap();

        assert_eq!(report.skipped, 2);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }
}
