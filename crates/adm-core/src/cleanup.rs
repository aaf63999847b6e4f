//! Cleanup Scheduler (spec.md §4.5 "Cleanup schedulers").
//!
//! Grounded on `ddm_core::scheduler::run`'s job-loop shape, reworked from
//! "pick the next queued job" to "compute a wake-at-midnight deadline and
//! sweep" — the teacher has no existing cron-like scheduler to lift
//! directly, so only the loop's overall shape (compute a deadline, sleep
//! until it, run the unit of work, repeat) survives.

use crate::store::TaskStore;
use crate::task::TaskStatus;
use chrono::{DateTime, Duration as ChronoDuration, Local, TimeZone, Utc};
use std::path::Path;

/// Deletes completed-task files older than `auto_cleanup_days` (if > 0).
/// Returns the ids removed, for logging (spec.md §4.5 "Age-based").
pub async fn run_age_based_sweep(
    store: &mut TaskStore,
    packages_base: &Path,
    auto_cleanup_days: u32,
) -> anyhow::Result<Vec<uuid::Uuid>> {
    if auto_cleanup_days == 0 {
        return Ok(Vec::new());
    }
    let threshold = Utc::now() - ChronoDuration::hours(i64::from(auto_cleanup_days) * 24);

    let stale: Vec<uuid::Uuid> = {
        let mut ids = Vec::new();
        for task in store.all_completed() {
            let Some(path) = &task.file_path else { continue };
            if let Ok(modified) = file_modified_utc(path).await {
                if modified < threshold {
                    ids.push(task.id);
                }
            }
        }
        ids
    };

    for id in &stale {
        delete_task_files(store, packages_base, *id).await?;
    }

    Ok(stale)
}

/// Deletes completed-task files by ascending modification time until the
/// total is within `auto_cleanup_max_mb` (if > 0). Run before each new
/// download starts, in addition to the age-based sweep (spec.md §4.5
/// "Size-based").
pub async fn run_size_based_sweep(
    store: &mut TaskStore,
    packages_base: &Path,
    auto_cleanup_max_mb: u64,
) -> anyhow::Result<Vec<uuid::Uuid>> {
    if auto_cleanup_max_mb == 0 {
        return Ok(Vec::new());
    }
    let budget_bytes = auto_cleanup_max_mb * 1024 * 1024;

    let mut entries: Vec<(uuid::Uuid, std::path::PathBuf, u64, DateTime<Utc>)> = Vec::new();
    for task in store.all_completed() {
        let Some(path) = &task.file_path else { continue };
        if let Ok(meta) = tokio::fs::metadata(path).await {
            let modified = file_modified_utc(path).await.unwrap_or_else(|_| Utc::now());
            entries.push((task.id, path.clone(), meta.len(), modified));
        }
    }

    let total: u64 = entries.iter().map(|(_, _, size, _)| size).sum();
    if total <= budget_bytes {
        return Ok(Vec::new());
    }

    entries.sort_by_key(|(_, _, _, modified)| *modified);

    let mut running = total;
    let mut removed = Vec::new();
    for (id, _, size, _) in entries {
        if running <= budget_bytes {
            break;
        }
        delete_task_files(store, packages_base, id).await?;
        running = running.saturating_sub(size);
        removed.push(id);
    }
    Ok(removed)
}

/// Combined sweep run at the start of each new download (spec.md §4.5 "Run
/// before each new download starts"): both age-based and size-based
/// cleanup, back to back. The midnight-scheduled sweep started from
/// `DownloadManager::new` runs [`run_age_based_sweep`] on its own instead —
/// size-based cleanup is deliberately download-triggered only.
pub async fn run_age_and_size_sweep(
    store: &mut TaskStore,
    packages_base: &Path,
    auto_cleanup_days: u32,
    auto_cleanup_max_mb: u64,
) -> anyhow::Result<()> {
    run_age_based_sweep(store, packages_base, auto_cleanup_days).await?;
    run_size_based_sweep(store, packages_base, auto_cleanup_max_mb).await?;
    Ok(())
}

async fn file_modified_utc(path: &Path) -> anyhow::Result<DateTime<Utc>> {
    let meta = tokio::fs::metadata(path).await?;
    let modified = meta.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}

/// Removes a completed task's file (and now-empty parent directories up to
/// `packages_base`) and drops it from the store, mirroring the Manager's
/// `delete(id)` filesystem discipline (spec.md §4.6 "delete").
async fn delete_task_files(
    store: &mut TaskStore,
    packages_base: &Path,
    id: uuid::Uuid,
) -> anyhow::Result<()> {
    if let Some(task) = store.remove(id) {
        if let Some(path) = task.file_path {
            if path.starts_with(packages_base) && path.is_file() {
                let _ = tokio::fs::remove_file(&path).await;
                let mut dir = path.parent().map(Path::to_path_buf);
                while let Some(d) = dir {
                    if d == packages_base || !d.starts_with(packages_base) {
                        break;
                    }
                    if tokio::fs::remove_dir(&d).await.is_err() {
                        break;
                    }
                    dir = d.parent().map(Path::to_path_buf);
                }
            }
        }
    }
    Ok(())
}

/// Computes the duration until the next local midnight, for the caller to
/// `tokio::time::sleep` on (spec.md §4.5: "Rescheduling uses absolute
/// wake-at-midnight computation each iteration to avoid clock drift").
pub fn duration_until_next_local_midnight() -> std::time::Duration {
    let now = Local::now();
    let tomorrow_midnight = (now + ChronoDuration::days(1))
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time");
    let next_midnight = Local
        .from_local_datetime(&tomorrow_midnight)
        .single()
        .unwrap_or_else(|| now + ChronoDuration::hours(24));
    (next_midnight - now)
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(24 * 60 * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_midnight_is_between_zero_and_twenty_four_hours_away() {
        let d = duration_until_next_local_midnight();
        assert!(d.as_secs() <= 24 * 60 * 60);
    }

    #[tokio::test]
    async fn zero_budget_disables_age_based_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TaskStore::open(dir.path()).await.unwrap();
        let removed = run_age_based_sweep(&mut store, &store.packages_base(), 0)
            .await
            .unwrap();
        assert!(removed.is_empty());
    }

    #[tokio::test]
    async fn zero_budget_disables_size_based_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = TaskStore::open(dir.path()).await.unwrap();
        let removed = run_size_based_sweep(&mut store, &store.packages_base(), 0)
            .await
            .unwrap();
        assert!(removed.is_empty());
    }

    #[tokio::test]
    async fn age_based_sweep_removes_stale_completed_task() {
        use crate::task::{SoftwareDescriptor, Task};

        let dir = tempfile::tempdir().unwrap();
        let mut store = TaskStore::open(dir.path()).await.unwrap();
        let packages_base = store.packages_base();

        let artifact = packages_base.join("acct/com.example.app/1.0/file.ipa");
        tokio::fs::create_dir_all(artifact.parent().unwrap()).await.unwrap();
        tokio::fs::write(&artifact, b"data").await.unwrap();

        let old_time = std::time::SystemTime::now() - std::time::Duration::from_secs(10 * 24 * 60 * 60);
        filetime::set_file_mtime(&artifact, filetime::FileTime::from_system_time(old_time)).ok();

        let mut task = Task::new(
            SoftwareDescriptor {
                name: "Example".into(),
                bundle_id: "com.example.app".into(),
                version: "1.0".into(),
                file_size_bytes: None,
            },
            "acct".into(),
            String::new(),
            vec![],
            None,
        );
        task.status = TaskStatus::Completed;
        task.file_path = Some(artifact.clone());
        let id = task.id;
        store.insert(task);

        let removed = run_age_based_sweep(&mut store, &packages_base, 7).await.unwrap();
        assert_eq!(removed, vec![id]);
        assert!(store.get(id).is_none());
    }
}
