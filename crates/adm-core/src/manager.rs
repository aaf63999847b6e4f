//! Download Manager (spec.md §4.6).
//!
//! Grounded on `ddm_core::scheduler::execute`'s setup → download → finish
//! pipeline shape and `ddm_core::control::JobControl`'s abort-token registry
//! keyed by job id (here, task id), combined into a single `tokio::sync::
//! Mutex`-guarded map per spec.md §9's explicit single-writer design note.

use crate::cleanup;
use crate::config::{AdmConfig, DOWNLOAD_TIMEOUT};
use crate::downloader::{cancel::CancelHandle, probe, ChunkedDownloader, ProgressFn};
use crate::error::{AdmError, ChunkError, DownloadError, InvalidPathError, PreflightError};
use crate::fanout::{Event, Fanout};
use crate::injector;
use crate::store::TaskStore;
use crate::task::{PublicTask, SoftwareDescriptor, Sinf, Task, TaskStatus};
use crate::validate;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

/// Per-task bookkeeping that lives alongside the task map itself (spec.md
/// §4.5 "Auxiliary indices keyed by id: cancellation handle, active
/// Downloader, and progress-subscriber set" — the subscriber set lives in
/// [`Fanout`] instead, so it can be shared without holding the task-map lock).
struct Inner {
    store: TaskStore,
    cancels: HashMap<Uuid, CancelHandle>,
    downloaders: HashMap<Uuid, Arc<ChunkedDownloader>>,
}

/// Orchestrates task lifecycle: creation, the full download→inject→complete
/// pipeline, pause/resume/delete, and progress subscription.
pub struct DownloadManager {
    config: AdmConfig,
    inner: Mutex<Inner>,
    fanout: Arc<Fanout>,
}

impl DownloadManager {
    pub async fn new(config: AdmConfig) -> anyhow::Result<Arc<Self>> {
        let store = TaskStore::open(&config.data_dir).await?;
        let this = Arc::new(Self {
            config,
            inner: Mutex::new(Inner {
                store,
                cancels: HashMap::new(),
                downloaders: HashMap::new(),
            }),
            fanout: Arc::new(Fanout::new()),
        });

        tokio::spawn(this.clone().run_age_sweep_scheduler());

        Ok(this)
    }

    /// spec.md §4.5 step 5 "Run age-based cleanup once, then schedule the
    /// next run at the next local midnight": runs independently of the
    /// per-download sweep in `start_download`, for processes that stay up
    /// across midnight without ever starting a new download.
    async fn run_age_sweep_scheduler(self: Arc<Self>) {
        self.run_age_based_sweep_once().await;
        loop {
            tokio::time::sleep(cleanup::duration_until_next_local_midnight()).await;
            self.run_age_based_sweep_once().await;
        }
    }

    async fn run_age_based_sweep_once(&self) {
        let mut inner = self.inner.lock().await;
        let packages_base = inner.store.packages_base();
        match cleanup::run_age_based_sweep(&mut inner.store, &packages_base, self.config.auto_cleanup_days).await {
            Ok(removed) if !removed.is_empty() => {
                if let Err(e) = inner.store.persist().await {
                    tracing::warn!(error = %e, "failed to persist store after age-based cleanup sweep");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "age-based cleanup sweep failed"),
        }
    }

    /// spec.md §4.6 `create`.
    pub async fn create(
        self: &Arc<Self>,
        software: SoftwareDescriptor,
        account_hash: String,
        download_url: String,
        sinfs: Vec<Sinf>,
        itunes_metadata: Option<String>,
    ) -> Result<PublicTask, AdmError> {
        validate::validate_download_url(&download_url)?;
        validate::sanitize(&account_hash, "accountHash")?;
        validate::sanitize(&software.bundle_id, "bundleID")?;
        validate::sanitize(&software.version, "version")?;

        if self.config.max_download_mb > 0 {
            self.run_size_preflight(&download_url).await?;
        }

        let task = Task::new(software, account_hash, download_url, sinfs, itunes_metadata);
        let public = task.to_public();
        let id = task.id;

        {
            let mut inner = self.inner.lock().await;
            inner.store.insert(task);
        }

        let this = self.clone();
        tokio::spawn(async move { this.start_download(id).await });

        Ok(public)
    }

    /// spec.md §6 "Size pre-flight": run only when `maxDownloadMB > 0`,
    /// before a task is created, so an oversized request never produces a
    /// task at all.
    async fn run_size_preflight(&self, download_url: &str) -> Result<(), PreflightError> {
        let limit_mb = self.config.max_download_mb;
        let url = download_url.to_string();
        let total = tokio::task::spawn_blocking(move || probe::probe_total_size(&url))
            .await
            .map_err(|e| PreflightError::ProbeFailed(e.to_string()))?
            .map_err(|e| PreflightError::ProbeFailed(e.to_string()))?;

        let Some(total) = total else {
            return Err(PreflightError::UnableToVerifySize);
        };

        let size_mb = total.div_ceil(1024 * 1024);
        if size_mb > limit_mb {
            return Err(PreflightError::SizeExceeded { size_mb, limit_mb });
        }
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<PublicTask, AdmError> {
        let inner = self.inner.lock().await;
        inner.store.get(id).map(Task::to_public).ok_or(AdmError::NotFound)
    }

    /// spec.md §6 "empty list when query absent/empty".
    pub async fn list(&self, account_hashes: Option<&[String]>) -> Vec<PublicTask> {
        let inner = self.inner.lock().await;
        inner
            .store
            .list(account_hashes)
            .into_iter()
            .map(Task::to_public)
            .collect()
    }

    /// spec.md §4.6 `delete`.
    pub async fn delete(&self, id: Uuid) -> Result<(), AdmError> {
        let mut inner = self.inner.lock().await;

        if let Some(cancel) = inner.cancels.remove(&id) {
            cancel.cancel();
        }
        if let Some(downloader) = inner.downloaders.remove(&id) {
            downloader.abort().await;
        }

        let packages_base = inner.store.packages_base();
        let task = inner.store.remove(id).ok_or(AdmError::NotFound)?;

        if let Some(path) = &task.file_path {
            if path.starts_with(&packages_base) && path.is_file() {
                let _ = tokio::fs::remove_file(path).await;
                let mut dir = path.parent().map(std::path::Path::to_path_buf);
                while let Some(d) = dir {
                    if d == packages_base || !d.starts_with(&packages_base) {
                        break;
                    }
                    if tokio::fs::remove_dir(&d).await.is_err() {
                        break;
                    }
                    dir = d.parent().map(std::path::Path::to_path_buf);
                }
            }
        }

        inner
            .store
            .persist()
            .await
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        self.fanout.clear(id);
        Ok(())
    }

    /// spec.md §4.6 `pause`: valid only when `status == downloading`.
    pub async fn pause(&self, id: Uuid) -> Result<(), AdmError> {
        let mut inner = self.inner.lock().await;
        {
            let task = inner.store.get(id).ok_or(AdmError::NotFound)?;
            if task.status != TaskStatus::Downloading {
                return Err(AdmError::InvalidState);
            }
        }

        if let Some(cancel) = inner.cancels.get(&id).cloned() {
            cancel.cancel();
        }
        if let Some(downloader) = inner.downloaders.get(&id).cloned() {
            downloader.abort().await;
        }

        let public = {
            let task = inner.store.get_mut(id).ok_or(AdmError::NotFound)?;
            task.status = TaskStatus::Paused;
            task.to_public()
        };
        drop(inner);
        self.fanout.notify(id, Event::Snapshot(public));
        Ok(())
    }

    /// spec.md §4.6 `resume`: re-invokes `startDownload` from byte 0.
    pub async fn resume(self: &Arc<Self>, id: Uuid) -> Result<(), AdmError> {
        {
            let inner = self.inner.lock().await;
            let task = inner.store.get(id).ok_or(AdmError::NotFound)?;
            if task.status != TaskStatus::Paused {
                return Err(AdmError::InvalidState);
            }
        }
        let this = self.clone();
        tokio::spawn(async move { this.start_download(id).await });
        Ok(())
    }

    /// spec.md §4.6 `subscribe`: registers a progress listener and delivers
    /// the current state as the first event.
    pub async fn subscribe(&self, id: Uuid) -> Result<mpsc::UnboundedReceiver<Event>, AdmError> {
        let inner = self.inner.lock().await;
        let task = inner.store.get(id).ok_or(AdmError::NotFound)?;
        let public = task.to_public();
        let rx = self.fanout.subscribe(id);
        self.fanout.notify(id, Event::Snapshot(public));
        Ok(rx)
    }

    /// spec.md §4.6 `unsubscribe`.
    pub fn unsubscribe(&self, id: Uuid) {
        self.fanout.unsubscribe_closed(id);
    }

    /// spec.md §4.6 `startDownload`.
    async fn start_download(self: Arc<Self>, id: Uuid) {
        {
            let mut inner = self.inner.lock().await;
            let packages_base = inner.store.packages_base();
            if let Err(e) = cleanup::run_age_and_size_sweep(
                &mut inner.store,
                &packages_base,
                self.config.auto_cleanup_days,
                self.config.auto_cleanup_max_mb,
            )
            .await
            {
                tracing::warn!(error = %e, "pre-download cleanup sweep failed");
            }
        }

        let cancel = CancelHandle::new();
        {
            let mut inner = self.inner.lock().await;
            inner.cancels.insert(id, cancel.clone());
        }

        let timeout_cancel = cancel.clone();
        let timeout_handle = tokio::spawn(async move {
            tokio::time::sleep(DOWNLOAD_TIMEOUT).await;
            timeout_cancel.cancel();
        });

        let result = self.run_download_and_inject(id, cancel).await;

        timeout_handle.abort();
        {
            let mut inner = self.inner.lock().await;
            inner.cancels.remove(&id);
            inner.downloaders.remove(&id);
        }

        if let Err(err) = result {
            self.handle_start_download_failure(id, err).await;
        }
    }

    async fn run_download_and_inject(
        self: &Arc<Self>,
        id: Uuid,
        cancel: CancelHandle,
    ) -> Result<(), DownloadError> {
        // Step 4: transition to downloading.
        let (download_url, sinfs, itunes_metadata, account_hash, bundle_id, version) = {
            let mut inner = self.inner.lock().await;
            let task = inner.store.get_mut(id).ok_or(DownloadError::Aborted)?;
            task.status = TaskStatus::Downloading;
            task.progress = 0;
            task.speed = "0 B/s".to_string();
            task.error = None;
            let snapshot = (
                task.download_url.clone(),
                task.sinfs.clone(),
                task.itunes_metadata.clone(),
                task.account_hash.clone(),
                task.software.bundle_id.clone(),
                task.software.version.clone(),
            );
            let public = task.to_public();
            self.fanout.notify(id, Event::Snapshot(public));
            snapshot
        };

        // Step 5: re-sanitize path segments and compose the destination dir.
        let account_hash = validate::sanitize(&account_hash, "accountHash").map_err(|_| DownloadError::Invalid)?;
        let bundle_id = validate::sanitize(&bundle_id, "bundleID").map_err(|_| DownloadError::Invalid)?;
        let version = validate::sanitize(&version, "version").map_err(|_| DownloadError::Invalid)?;

        let packages_base = self.config.packages_base();
        let dest_dir = packages_base.join(&account_hash).join(&bundle_id).join(&version);
        if !dest_dir.starts_with(&packages_base) {
            return Err(DownloadError::Path(InvalidPathError));
        }
        tokio::fs::create_dir_all(&dest_dir)
            .await
            .map_err(|e| DownloadError::Chunk(ChunkError::Storage(e)))?;
        let file_path: PathBuf = dest_dir.join(format!("{id}.ipa"));

        {
            let mut inner = self.inner.lock().await;
            if let Some(task) = inner.store.get_mut(id) {
                task.file_path = Some(file_path.clone());
            }
        }

        // Step 6: re-validate the download URL.
        validate::validate_download_url(&download_url).map_err(|_| DownloadError::Invalid)?;

        // Step 7: construct the Downloader, sharing the same cancellation
        // source pause()/delete()/the global timeout already hold, and
        // register it.
        let downloader = Arc::new(ChunkedDownloader::new(
            download_url,
            file_path.clone(),
            self.config.download_threads,
            cancel.clone(),
        ));
        {
            let mut inner = self.inner.lock().await;
            inner.downloaders.insert(id, downloader.clone());
        }

        let manager = self.clone();
        let on_progress: ProgressFn = Arc::new(move |progress| {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager.apply_progress(id, progress).await;
            });
        });

        // Step 8.
        downloader.run(on_progress).await?;

        // Step 10: inject, if there are signature blobs to append.
        if !sinfs.is_empty() {
            {
                let mut inner = self.inner.lock().await;
                if let Some(task) = inner.store.get_mut(id) {
                    task.status = TaskStatus::Injecting;
                    task.progress = 100;
                    let public = task.to_public();
                    self.fanout.notify(id, Event::Snapshot(public));
                }
            }
            injector::inject(&file_path, &sinfs, itunes_metadata.as_deref())
                .await
                .map_err(|_| DownloadError::Invalid)?;
        }

        // Step 11: complete, unless a concurrent pause() already won the
        // race and flipped the task to `paused` (same check-after-await
        // discipline as the failure path, applied symmetrically).
        {
            let mut inner = self.inner.lock().await;
            let already_paused = inner
                .store
                .get(id)
                .is_some_and(|t| t.status == TaskStatus::Paused);
            if !already_paused {
                if let Some(task) = inner.store.get_mut(id) {
                    task.status = TaskStatus::Completed;
                    task.scrub_secrets();
                    let public = task.to_public();
                    self.fanout.notify(id, Event::Snapshot(public));
                }
                inner.store.persist().await.map_err(|e| {
                    DownloadError::Chunk(ChunkError::Storage(std::io::Error::other(e.to_string())))
                })?;
            }
        }

        Ok(())
    }

    async fn apply_progress(&self, id: Uuid, progress: crate::downloader::speed::DownloadProgress) {
        let mut inner = self.inner.lock().await;
        if let Some(task) = inner.store.get_mut(id) {
            task.speed = progress.speed.clone();
            if progress.total > 0 {
                let pct = (progress.downloaded as f64 / progress.total as f64 * 100.0).round();
                task.progress = pct.clamp(0.0, 100.0) as u8;
            }
        }
        self.fanout.notify(
            id,
            Event::Progress {
                progress: inner.store.get(id).map(|t| t.progress).unwrap_or(0),
                speed: progress.speed,
            },
        );
    }

    /// spec.md §4.6 step 12.
    async fn handle_start_download_failure(&self, id: Uuid, err: DownloadError) {
        let mut inner = self.inner.lock().await;
        let Some(task) = inner.store.get_mut(id) else {
            return;
        };

        if task.status == TaskStatus::Paused {
            // pause() already won the race; leave its state alone.
            return;
        }

        task.status = TaskStatus::Failed;
        task.error = Some(match err {
            DownloadError::Aborted => "Download timed out".to_string(),
            DownloadError::Path(e) => e.to_string(),
            _ => "Download failed".to_string(),
        });
        let public = task.to_public();
        self.fanout.notify(id, Event::Snapshot(public));
    }
}
