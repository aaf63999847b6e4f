//! `adm resume <id>` – resume a paused download from byte 0.

use adm_core::manager::DownloadManager;
use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

pub async fn run_resume(manager: &Arc<DownloadManager>, id: Uuid) -> Result<()> {
    manager.resume(id).await?;
    println!("resumed task {id}");
    Ok(())
}
