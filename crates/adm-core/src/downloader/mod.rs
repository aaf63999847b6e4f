//! Chunked Downloader (spec.md §4.3).
//!
//! Ties together [`probe`], [`plan`], [`chunked`] (per-chunk fetch/retry),
//! [`single`] (fallback), and [`storage`] (part-file merge) the way
//! `ddm_core::downloader` composes `fetch_head` + `segmenter` + `segment` +
//! `single` behind one `Downloader` entry point.

pub mod cancel;
pub mod chunked;
pub mod plan;
pub mod probe;
pub mod single;
pub mod speed;
pub mod storage;

use crate::config::MAX_ARTIFACT_SIZE_BYTES;
use crate::error::{ChunkError, DownloadError};
use cancel::CancelHandle;
use plan::plan_chunks;
use speed::{format_rate, DownloadProgress};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

const PROGRESS_TICK: Duration = crate::config::PROGRESS_TICK;

/// Progress callback, shared across the ticker task and the final event.
pub type ProgressFn = Arc<dyn Fn(DownloadProgress) + Send + Sync>;

/// A single chunked-or-single-stream download run (spec.md §4.3).
pub struct ChunkedDownloader {
    url: String,
    dest_path: PathBuf,
    threads: usize,
    cancel: CancelHandle,
}

impl ChunkedDownloader {
    /// `threads` is the caller's already-clamped `[1, 32]` configuration
    /// value (spec.md §4.3 "Threads default from configuration"). `cancel`
    /// is shared with the caller (the Manager's per-task cancellation
    /// source, spec.md §4.6 step 2) so `pause()`/`delete()`/the global
    /// timeout can abort this run without going through this struct.
    pub fn new(url: String, dest_path: PathBuf, threads: usize, cancel: CancelHandle) -> Self {
        Self {
            url,
            dest_path,
            threads: threads.clamp(1, 32),
            cancel,
        }
    }

    /// A clone of this run's cancellation handle, for the caller to hold
    /// onto and trigger [`Self::abort`] equivalents from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Runs the full probe → (chunked | single-stream) → merge pipeline,
    /// delivering throttled progress via `on_progress` (spec.md §4.3).
    pub async fn run(&self, on_progress: ProgressFn) -> Result<(), DownloadError> {
        let url = self.url.clone();
        let probe_result = tokio::task::spawn_blocking(move || probe::probe(&url))
            .await
            .map_err(|_| DownloadError::Aborted)?;

        match probe_result {
            Ok(head) if head.supports_chunked() => {
                let total = head.content_length.expect("supports_chunked implies Some");
                if total > MAX_ARTIFACT_SIZE_BYTES {
                    return Err(DownloadError::SizeLimitExceeded);
                }
                self.run_chunked(total, on_progress).await
            }
            _ => self.run_single(on_progress).await,
        }
    }

    async fn run_chunked(&self, total: u64, on_progress: ProgressFn) -> Result<(), DownloadError> {
        let ranges = plan_chunks(total, self.threads);
        let counters: Vec<Arc<AtomicU64>> =
            ranges.iter().map(|_| Arc::new(AtomicU64::new(0))).collect();
        let done = Arc::new(AtomicBool::new(false));
        let ticker = spawn_ticker(counters.clone(), total, done.clone(), on_progress.clone());

        let mut handles = Vec::with_capacity(ranges.len());
        for (range, counter) in ranges.iter().copied().zip(counters.iter().cloned()) {
            let url = self.url.clone();
            let part = storage::part_path(&self.dest_path, range.index);
            let cancel = self.cancel.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                chunked::fetch_chunk_with_retry(&url, range, &part, counter, &cancel)
            }));
        }

        let mut first_err: Option<ChunkError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_err.get_or_insert(e);
                }
                Err(_join_err) => {
                    first_err.get_or_insert(ChunkError::Aborted);
                }
            }
        }

        done.store(true, Ordering::SeqCst);
        let _ = ticker.await;

        if let Some(e) = first_err {
            return Err(if e.is_abort() {
                DownloadError::Aborted
            } else {
                DownloadError::Chunk(e)
            });
        }

        storage::merge_parts(&self.dest_path, ranges.len())
            .await
            .map_err(|e| DownloadError::Chunk(ChunkError::Storage(e)))?;

        on_progress(DownloadProgress {
            downloaded: total,
            total,
            speed: "0 B/s".to_string(),
        });
        Ok(())
    }

    async fn run_single(&self, on_progress: ProgressFn) -> Result<(), DownloadError> {
        let counter = Arc::new(AtomicU64::new(0));
        let done = Arc::new(AtomicBool::new(false));
        // Total is unknown until the single-stream transfer reports its own
        // Content-Length (or never, for chunked-transfer-encoded bodies);
        // the ticker reports 0 as "unknown" the way the teacher's single
        // download path does.
        let ticker = spawn_ticker(vec![counter.clone()], 0, done.clone(), on_progress.clone());

        let url = self.url.clone();
        let dest = self.dest_path.clone();
        let cancel = self.cancel.clone();
        let result = tokio::task::spawn_blocking(move || {
            single::download_single(&url, &dest, counter, &cancel)
        })
        .await
        .map_err(|_| ChunkError::Aborted);

        done.store(true, Ordering::SeqCst);
        let _ = ticker.await;

        let result = result.and_then(|inner| inner);
        match result {
            Ok(()) => {
                let downloaded = tokio::fs::metadata(&self.dest_path)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(0);
                on_progress(DownloadProgress {
                    downloaded,
                    total: downloaded,
                    speed: "0 B/s".to_string(),
                });
                Ok(())
            }
            Err(e) if e.is_abort() => Err(DownloadError::Aborted),
            Err(e) => Err(DownloadError::Chunk(e)),
        }
    }

    /// Sets the abort flag, then removes every sibling `<basename>.part*`
    /// file (spec.md §4.3 "Abort"). Any in-flight curl transfer observes
    /// the flag on its next `write_function` call and tears itself down.
    pub async fn abort(&self) {
        self.cancel.cancel();
        let _ = cancel::remove_part_files(&self.dest_path).await;
    }
}

fn spawn_ticker(
    counters: Vec<Arc<AtomicU64>>,
    total: u64,
    done: Arc<AtomicBool>,
    on_progress: ProgressFn,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PROGRESS_TICK);
        interval.tick().await; // first tick fires immediately; skip it
        let mut last_total = 0u64;
        loop {
            interval.tick().await;
            if done.load(Ordering::SeqCst) {
                break;
            }
            let sum: u64 = counters.iter().map(|c| c.load(Ordering::SeqCst)).sum();
            let delta = sum.saturating_sub(last_total);
            last_total = sum;
            let rate = delta as f64 / PROGRESS_TICK.as_secs_f64();
            on_progress(DownloadProgress {
                downloaded: sum,
                total,
                speed: format_rate(rate),
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threads_are_clamped_to_configured_bounds() {
        let d = ChunkedDownloader::new(
            "https://example.com/x".to_string(),
            PathBuf::from("/tmp/x"),
            0,
            CancelHandle::new(),
        );
        assert_eq!(d.threads, 1);
        let d = ChunkedDownloader::new(
            "https://example.com/x".to_string(),
            PathBuf::from("/tmp/x"),
            999,
            CancelHandle::new(),
        );
        assert_eq!(d.threads, 32);
    }

    #[tokio::test]
    async fn abort_before_run_sets_cancel_flag() {
        let d = ChunkedDownloader::new(
            "https://example.com/x".to_string(),
            PathBuf::from("/tmp/adm-test-abort/app.ipa"),
            4,
            CancelHandle::new(),
        );
        d.abort().await;
        assert!(d.cancel_handle().is_cancelled());
    }

    #[tokio::test]
    async fn shared_cancel_handle_is_observed_by_the_downloader() {
        let shared = CancelHandle::new();
        let d = ChunkedDownloader::new(
            "https://example.com/x".to_string(),
            PathBuf::from("/tmp/adm-test-shared/app.ipa"),
            4,
            shared.clone(),
        );
        shared.cancel();
        assert!(d.cancel_handle().is_cancelled());
    }
}
