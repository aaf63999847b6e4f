//! `adm create` – submit a new download task.

use adm_core::manager::DownloadManager;
use adm_core::task::{Sinf, SoftwareDescriptor};
use anyhow::{Context, Result};
use base64::Engine;
use std::sync::Arc;

/// A `--sinf <id>:<path>` argument: `path` holds the base64-encoded blob text.
#[derive(Debug, Clone)]
pub struct SinfArg {
    pub id: i64,
    pub path: std::path::PathBuf,
}

impl std::str::FromStr for SinfArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, path) = s
            .split_once(':')
            .ok_or_else(|| "expected <id>:<path>".to_string())?;
        let id = id
            .parse::<i64>()
            .map_err(|e| format!("invalid sinf id {id:?}: {e}"))?;
        Ok(SinfArg {
            id,
            path: std::path::PathBuf::from(path),
        })
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn run_create(
    manager: &Arc<DownloadManager>,
    url: String,
    account: String,
    bundle_id: String,
    version: String,
    name: String,
    file_size_bytes: Option<u64>,
    sinfs: Vec<SinfArg>,
    metadata_file: Option<std::path::PathBuf>,
) -> Result<()> {
    let sinfs = sinfs
        .into_iter()
        .map(|s| -> Result<Sinf> {
            let blob = std::fs::read_to_string(&s.path)
                .with_context(|| format!("reading sinf blob {}", s.path.display()))?;
            let blob = blob.trim().to_string();
            base64::engine::general_purpose::STANDARD
                .decode(&blob)
                .with_context(|| format!("sinf {} at {} is not valid base64", s.id, s.path.display()))?;
            Ok(Sinf { id: s.id, sinf: blob })
        })
        .collect::<Result<Vec<_>>>()?;

    let itunes_metadata = metadata_file
        .map(|p| -> Result<String> {
            let blob = std::fs::read_to_string(&p)
                .with_context(|| format!("reading metadata file {}", p.display()))?;
            let blob = blob.trim().to_string();
            base64::engine::general_purpose::STANDARD
                .decode(&blob)
                .with_context(|| format!("metadata file {} is not valid base64", p.display()))?;
            Ok(blob)
        })
        .transpose()?;

    let software = SoftwareDescriptor {
        name,
        bundle_id,
        version,
        file_size_bytes,
    };

    let task = manager
        .create(software, account, url, sinfs, itunes_metadata)
        .await?;

    println!("created task {} ({:?})", task.id, task.status);
    Ok(())
}
