//! `adm delete <id>` – cancel (if running) and remove a task and its file.

use adm_core::manager::DownloadManager;
use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

pub async fn run_delete(manager: &Arc<DownloadManager>, id: Uuid) -> Result<()> {
    manager.delete(id).await?;
    println!("deleted task {id}");
    Ok(())
}
