//! Staging and archive-append (spec.md §4.4 "Append").
//!
//! The teacher has no in-place archive-mutation code of its own (none of the
//! pack's five teacher repos append to a live ZIP) — spec.md §9 treats this
//! as an external-tool problem in every target language, so this shells out
//! to the system `zip` tool the same way the rest of the codebase reaches
//! for an external process where the ecosystem doesn't have a good native
//! answer.

use crate::error::InjectError;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// One file to stage under the temp root and then append into the archive.
pub struct StagedEntry {
    /// Path within the archive, e.g. `Payload/Example.app/SC_Info/Example.sinf`.
    pub archive_path: String,
    pub contents: Vec<u8>,
}

/// Stages every entry under a fresh temp directory mirroring its archive
/// path, then invokes the external archive tool to append them all into
/// `archive_path` with no compression. The staging directory is removed on
/// every exit path.
pub async fn stage_and_append(
    archive_path: &Path,
    entries: Vec<StagedEntry>,
) -> Result<(), InjectError> {
    if entries.is_empty() {
        return Ok(());
    }

    let staging_root = tempfile::tempdir()?;
    let root = staging_root.path().to_path_buf();

    let mut relative_paths = Vec::with_capacity(entries.len());
    for entry in &entries {
        let staged_path = resolve_staged_path(&root, &entry.archive_path)?;
        if let Some(parent) = staged_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&staged_path, &entry.contents).await?;
        relative_paths.push(entry.archive_path.clone());
    }

    let result = run_zip_append(archive_path, &root, &relative_paths).await;
    drop(staging_root); // removes the temp directory regardless of outcome
    result
}

/// Resolves `archive_path` beneath `root` and asserts the result stays
/// strictly within it (spec.md §4.4: "guard against adversarial `SinfPaths`
/// values").
fn resolve_staged_path(root: &Path, archive_path: &str) -> Result<PathBuf, InjectError> {
    let candidate = root.join(archive_path);
    let normalized = normalize(&candidate);
    let normalized_root = normalize(root);
    if !normalized.starts_with(&normalized_root) || normalized == normalized_root {
        return Err(InjectError::UnsafeStagedPath);
    }
    Ok(candidate)
}

/// Lexical `..`/`.`-resolution without touching the filesystem (the path
/// need not exist yet).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Invokes `zip -0 <archive> -- <relative paths...>` from within the staging
/// root so the archive gains entries at exactly the given relative paths,
/// with no compression and no flag-injection risk from a hostile filename
/// (spec.md §4.4: "without interpreting any filename as a flag").
async fn run_zip_append(
    archive_path: &Path,
    staging_root: &Path,
    relative_paths: &[String],
) -> Result<(), InjectError> {
    let absolute_archive = std::path::absolute(archive_path)?;

    let mut cmd = Command::new("zip");
    cmd.current_dir(staging_root)
        .arg("-0")
        .arg(&absolute_archive)
        .arg("--");
    for path in relative_paths {
        cmd.arg(path);
    }

    let output = cmd.output().await?;
    if !output.status.success() {
        return Err(InjectError::ToolFailed(
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ));
    }
    Ok(())
}
