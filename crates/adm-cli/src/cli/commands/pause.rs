//! `adm pause <id>` – pause an in-progress download.

use adm_core::manager::DownloadManager;
use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

pub async fn run_pause(manager: &Arc<DownloadManager>, id: Uuid) -> Result<()> {
    manager.pause(id).await?;
    println!("paused task {id}");
    Ok(())
}
