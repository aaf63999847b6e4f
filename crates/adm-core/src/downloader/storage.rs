//! Sequential per-chunk storage (spec.md §4.3 "Per-chunk fetch", "Merge").
//!
//! Simplified, sequential-write sibling of `ddm_core::storage::writer::
//! StorageWriter`: the teacher pwrite()s every chunk into one preallocated
//! file at its byte offset, but spec.md calls for sibling part-files merged
//! after the fact, so there is no offset bookkeeping to share — each chunk
//! just appends to its own file.

use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs::File;

/// Path of the `i`th chunk's sibling temp file.
pub fn part_path(dest_path: &Path, index: usize) -> PathBuf {
    let mut name = dest_path.as_os_str().to_os_string();
    name.push(format!(".part{index}"));
    PathBuf::from(name)
}

/// Sequential writer for one chunk's part-file. Synchronous: every caller
/// runs inside `spawn_blocking` alongside the curl transfer that feeds it,
/// so there is no executor to yield to.
pub struct PartWriter {
    file: std::fs::File,
}

impl PartWriter {
    pub fn create(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            file: std::fs::File::create(path)?,
        })
    }

    pub fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.file.write_all(buf)
    }
}

/// Concatenates `count` sibling part-files (in index order) into `dest_path`,
/// then best-effort removes them (spec.md §4.3 "Merge").
pub async fn merge_parts(dest_path: &Path, count: usize) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut out = File::create(dest_path).await?;
    for i in 0..count {
        let part = part_path(dest_path, i);
        let mut part_file = File::open(&part).await?;
        tokio::io::copy(&mut part_file, &mut out).await?;
    }
    out.flush().await?;
    for i in 0..count {
        let _ = tokio::fs::remove_file(part_path(dest_path, i)).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn merge_concatenates_in_index_order_and_removes_parts() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.bin");

        PartWriter::create(&part_path(&dest, 0))
            .unwrap()
            .write_all(b"hello ")
            .unwrap();
        PartWriter::create(&part_path(&dest, 1))
            .unwrap()
            .write_all(b"world")
            .unwrap();

        merge_parts(&dest, 2).await.unwrap();

        let contents = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(contents, b"hello world");
        assert!(!part_path(&dest, 0).exists());
        assert!(!part_path(&dest, 1).exists());
    }

    #[test]
    fn part_path_appends_index_suffix() {
        let dest = Path::new("/data/app.ipa");
        assert_eq!(part_path(dest, 3), Path::new("/data/app.ipa.part3"));
    }
}
