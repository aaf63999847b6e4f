//! A single per-task cancellation source (spec.md §5 "Cancellation").
//!
//! Grounded on `ddm_core::control::JobControl`'s `Arc<AtomicBool>` abort
//! token, combined with the abort-check-inside-the-write-callback idiom
//! used by `chenxiaolong-nudl`'s `check_cancel`/`CancelOnDrop` so a
//! mid-transfer abort is observed promptly rather than only between chunks.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared cancellation flag. One instance covers the probe, every chunk
/// request, the single-stream body, and the progress ticker for a single
/// task (spec.md §5).
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Requests cancellation. Best-effort: in-flight curl transfers observe
    /// this on their next `write_function` invocation and abort themselves.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Removes every sibling part-file of `dest_path` (spec.md §4.3 "Abort":
/// "scans the destination directory and removes every sibling entry whose
/// name begins with `<basename>.part`").
pub async fn remove_part_files(dest_path: &Path) -> std::io::Result<()> {
    let Some(dir) = dest_path.parent() else {
        return Ok(());
    };
    let Some(basename) = dest_path.file_name().and_then(|n| n.to_str()) else {
        return Ok(());
    };
    let prefix = format!("{basename}.part");

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with(&prefix) {
                let _ = tokio::fs::remove_file(entry.path()).await;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_handle_is_not_cancelled() {
        let h = CancelHandle::new();
        assert!(!h.is_cancelled());
    }

    #[test]
    fn cancel_is_observed_through_clones() {
        let h = CancelHandle::new();
        let clone = h.clone();
        clone.cancel();
        assert!(h.is_cancelled());
    }

    #[tokio::test]
    async fn remove_part_files_removes_only_matching_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("app.ipa");
        tokio::fs::write(dir.path().join("app.ipa.part0"), b"a").await.unwrap();
        tokio::fs::write(dir.path().join("app.ipa.part1"), b"b").await.unwrap();
        tokio::fs::write(dir.path().join("other.ipa.part0"), b"c").await.unwrap();

        remove_part_files(&dest).await.unwrap();

        assert!(!dir.path().join("app.ipa.part0").exists());
        assert!(!dir.path().join("app.ipa.part1").exists());
        assert!(dir.path().join("other.ipa.part0").exists());
    }

    #[tokio::test]
    async fn remove_part_files_on_missing_dir_is_ok() {
        let missing = Path::new("/nonexistent/adm/test/dir/app.ipa");
        assert!(remove_part_files(missing).await.is_ok());
    }
}
