//! `adm watch <id>` – subscribe and print progress/status events until the
//! task reaches a terminal state.

use adm_core::fanout::Event;
use adm_core::manager::DownloadManager;
use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

pub async fn run_watch(manager: &Arc<DownloadManager>, id: Uuid) -> Result<()> {
    let mut rx = manager.subscribe(id).await?;

    while let Some(event) = rx.recv().await {
        match event {
            Event::Snapshot(task) => {
                println!("[{:?}] {}% {}", task.status, task.progress, task.speed);
                if task.status.is_terminal() {
                    if let Some(err) = task.error {
                        println!("error: {err}");
                    }
                    break;
                }
            }
            Event::Progress { progress, speed } => {
                println!("{progress}% {speed}");
            }
            Event::Status(status) => {
                println!("[{status:?}]");
                if status.is_terminal() {
                    break;
                }
            }
        }
    }

    manager.unsubscribe(id);
    Ok(())
}
