//! Process configuration, sourced from environment variables (spec.md §6).
//!
//! Shaped like the teacher's `DdmConfig`: a `serde`-derived struct with a
//! `Default` impl, except the values come from `std::env` rather than a
//! TOML file, since spec.md's configuration surface is entirely
//! environment-variable driven.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global artifact size cap: 8 GiB (spec.md §4.3, §6).
pub const MAX_ARTIFACT_SIZE_BYTES: u64 = 8 * 1024 * 1024 * 1024;
/// Per-chunk retry attempts (spec.md §4.3).
pub const CHUNK_RETRY_ATTEMPTS: u32 = 3;
/// Fixed delay between per-chunk retry attempts.
pub const CHUNK_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(2);
/// Global per-task download timeout: 8 hours (spec.md §4.6, §5).
pub const DOWNLOAD_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(8 * 60 * 60);
/// Progress ticker interval (spec.md §4.3).
pub const PROGRESS_TICK: std::time::Duration = std::time::Duration::from_millis(500);

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmConfig {
    /// HTTP listen port (consumed by the out-of-scope HTTP collaborator).
    pub port: u16,
    /// Root data directory; holds `packages/`, `tasks.json`, and the log file.
    pub data_dir: PathBuf,
    /// Public base URL (consumed by the out-of-scope HTTP collaborator).
    pub public_base_url: Option<String>,
    /// Disables the HTTPS redirect normally enforced by the outward collaborator.
    pub unsafe_disable_https_redirect: bool,
    /// Age-based cleanup horizon in days; 0 disables it.
    pub auto_cleanup_days: u32,
    /// Size-based cleanup budget in MB; 0 disables it.
    pub auto_cleanup_max_mb: u64,
    /// Pre-flight size cap in MB for `create`; 0 disables the check.
    pub max_download_mb: u64,
    /// Concurrent chunk threads for the Chunked Downloader, clamped to [1, 32].
    pub download_threads: usize,
    /// Shared-password gate, consumed by the out-of-scope auth collaborator.
    pub access_password: Option<String>,
    /// Build metadata surfaced by the out-of-scope `/api/settings` route.
    pub build_commit: Option<String>,
    pub build_date: Option<String>,
}

impl Default for AdmConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: default_data_dir(),
            public_base_url: None,
            unsafe_disable_https_redirect: false,
            auto_cleanup_days: 0,
            auto_cleanup_max_mb: 0,
            max_download_mb: 0,
            download_threads: 8,
            access_password: None,
            build_commit: None,
            build_date: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    xdg::BaseDirectories::with_prefix("adm")
        .ok()
        .map(|dirs| dirs.get_data_home())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|s| s.parse().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    env_string(name).map(|s| matches!(s.as_str(), "1" | "true" | "TRUE" | "yes"))
}

impl AdmConfig {
    /// Load configuration from the recognized environment variables
    /// (spec.md §6), falling back to defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let download_threads = env_parsed::<usize>("DOWNLOAD_THREADS")
            .unwrap_or(defaults.download_threads)
            .clamp(1, 32);

        Self {
            port: env_parsed("PORT").unwrap_or(defaults.port),
            data_dir: env_string("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            public_base_url: env_string("PUBLIC_BASE_URL"),
            unsafe_disable_https_redirect: env_bool(
                "UNSAFE_DANGEROUSLY_DISABLE_HTTPS_REDIRECT",
            )
            .unwrap_or(false),
            auto_cleanup_days: env_parsed("AUTO_CLEANUP_DAYS").unwrap_or(0),
            auto_cleanup_max_mb: env_parsed("AUTO_CLEANUP_MAX_MB").unwrap_or(0),
            max_download_mb: env_parsed("MAX_DOWNLOAD_MB").unwrap_or(0),
            download_threads,
            access_password: env_string("ACCESS_PASSWORD"),
            build_commit: env_string("BUILD_COMMIT"),
            build_date: env_string("BUILD_DATE"),
        }
    }

    /// Packages base directory: `<dataDir>/packages/`.
    pub fn packages_base(&self) -> PathBuf {
        self.data_dir.join("packages")
    }

    /// Task snapshot path: `<dataDir>/tasks.json`.
    pub fn tasks_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("tasks.json")
    }

    /// Legacy snapshot path removed on startup (spec.md §4.5 step 1).
    pub fn legacy_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("downloads.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = AdmConfig::default();
        assert_eq!(cfg.download_threads, 8);
        assert_eq!(cfg.auto_cleanup_days, 0);
        assert_eq!(cfg.auto_cleanup_max_mb, 0);
        assert_eq!(cfg.max_download_mb, 0);
    }

    #[test]
    fn packages_base_and_snapshot_paths() {
        let mut cfg = AdmConfig::default();
        cfg.data_dir = PathBuf::from("/tmp/adm-data");
        assert_eq!(cfg.packages_base(), PathBuf::from("/tmp/adm-data/packages"));
        assert_eq!(
            cfg.tasks_snapshot_path(),
            PathBuf::from("/tmp/adm-data/tasks.json")
        );
        assert_eq!(
            cfg.legacy_snapshot_path(),
            PathBuf::from("/tmp/adm-data/downloads.json")
        );
    }
}
