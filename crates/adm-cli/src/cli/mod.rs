//! CLI for the ADM download manager.

mod commands;
mod prefs;

use adm_core::config::AdmConfig;
use adm_core::manager::DownloadManager;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use commands::{run_create, run_delete, run_get, run_list, run_pause, run_resume, run_watch, SinfArg};

/// Top-level CLI for the ADM download manager.
#[derive(Debug, Parser)]
#[command(name = "adm")]
#[command(about = "adm: signed-application-archive download manager", long_about = None)]
pub struct Cli {
    /// Overrides `DATA_DIR` for this invocation and is remembered for next time.
    #[arg(long, global = true, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Overrides `DOWNLOAD_THREADS` for this invocation and is remembered for next time.
    #[arg(long, global = true, value_name = "N")]
    pub threads: Option<usize>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Create a new download task.
    Create {
        /// Direct HTTPS URL to download (must resolve to an `*.apple.com` host).
        url: String,
        #[arg(long)]
        account: String,
        #[arg(long = "bundle-id")]
        bundle_id: String,
        #[arg(long)]
        version: String,
        #[arg(long)]
        name: String,
        /// Expected size in bytes, if known.
        #[arg(long = "file-size")]
        file_size: Option<u64>,
        /// Repeatable `<sinfId>:<pathToBase64Blob>` pair.
        #[arg(long = "sinf", value_name = "ID:PATH")]
        sinf: Vec<SinfArg>,
        /// Path to a file containing the base64-encoded iTunes metadata plist.
        #[arg(long = "metadata-file")]
        metadata_file: Option<PathBuf>,
    },

    /// List tasks, optionally filtered by owning account hash.
    List {
        #[arg(long)]
        account: Option<String>,
    },

    /// Read a single task's sanitized projection.
    Get { id: Uuid },

    /// Subscribe to progress/status events until the task reaches a terminal state.
    Watch { id: Uuid },

    /// Pause an in-progress download.
    Pause { id: Uuid },

    /// Resume a paused download from byte 0.
    Resume { id: Uuid },

    /// Cancel (if running) and remove a task and its downloaded file.
    Delete { id: Uuid },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        let mut cli_prefs = prefs::load_or_init().unwrap_or_default();
        let mut config = AdmConfig::from_env();

        if let Some(dir) = cli.data_dir.clone() {
            config.data_dir = dir;
        } else if let Some(dir) = &cli_prefs.last_data_dir {
            config.data_dir = dir.clone();
        }
        if let Some(threads) = cli.threads.or(cli_prefs.download_threads) {
            config.download_threads = threads.clamp(1, 32);
        }

        cli_prefs.last_data_dir = Some(config.data_dir.clone());
        if cli.threads.is_some() {
            cli_prefs.download_threads = cli.threads;
        }
        let _ = prefs::save(&cli_prefs);

        let manager = DownloadManager::new(config).await?;

        match cli.command {
            CliCommand::Create {
                url,
                account,
                bundle_id,
                version,
                name,
                file_size,
                sinf,
                metadata_file,
            } => {
                run_create(
                    &manager,
                    url,
                    account,
                    bundle_id,
                    version,
                    name,
                    file_size,
                    sinf,
                    metadata_file,
                )
                .await?
            }
            CliCommand::List { account } => run_list(&manager, account).await?,
            CliCommand::Get { id } => run_get(&manager, id).await?,
            CliCommand::Watch { id } => run_watch(&manager, id).await?,
            CliCommand::Pause { id } => run_pause(&manager, id).await?,
            CliCommand::Resume { id } => run_resume(&manager, id).await?,
            CliCommand::Delete { id } => run_delete(&manager, id).await?,
        }

        Ok(())
    }
}
