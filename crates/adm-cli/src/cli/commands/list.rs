//! `adm list [--account <hash>]` – list tasks by owner.

use adm_core::manager::DownloadManager;
use anyhow::Result;
use std::sync::Arc;

pub async fn run_list(manager: &Arc<DownloadManager>, account: Option<String>) -> Result<()> {
    let accounts = account.map(|a| vec![a]);
    let tasks = manager.list(accounts.as_deref()).await;

    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }

    println!("{:<36} {:<11} {:<4} {}", "ID", "STATUS", "PCT", "BUNDLE");
    for t in tasks {
        println!(
            "{:<36} {:<11} {:<4} {}",
            t.id,
            format!("{:?}", t.status).to_lowercase(),
            t.progress,
            t.software.bundle_id
        );
    }
    Ok(())
}
