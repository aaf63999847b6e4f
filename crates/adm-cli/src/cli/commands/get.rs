//! `adm get <id>` – read a single task's sanitized projection.

use adm_core::manager::DownloadManager;
use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

pub async fn run_get(manager: &Arc<DownloadManager>, id: Uuid) -> Result<()> {
    let task = manager.get(id).await?;
    println!("id:       {}", task.id);
    println!("status:   {:?}", task.status);
    println!("progress: {}%", task.progress);
    println!("speed:    {}", task.speed);
    println!("bundle:   {}", task.software.bundle_id);
    println!("version:  {}", task.software.version);
    println!("hasFile:  {}", task.has_file);
    if let Some(err) = task.error {
        println!("error:    {err}");
    }
    Ok(())
}
