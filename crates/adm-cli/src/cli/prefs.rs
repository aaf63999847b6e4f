//! Small CLI-only preferences file, grounded on `ddm_core::config::load_or_init`:
//! a `serde`-derived struct with a `Default`, persisted as TOML under the
//! XDG config dir. Unrelated to [`adm_core::config::AdmConfig`] (which is
//! environment-driven) — this just remembers a couple of CLI conveniences
//! across invocations.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliPrefs {
    /// Overrides `AdmConfig::download_threads` when set.
    pub download_threads: Option<usize>,
    /// Last data directory passed via `--data-dir`, reused when omitted.
    pub last_data_dir: Option<PathBuf>,
}

impl Default for CliPrefs {
    fn default() -> Self {
        Self {
            download_threads: None,
            last_data_dir: None,
        }
    }
}

fn prefs_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("adm")?;
    Ok(xdg_dirs.place_config_file("cli-prefs.toml")?)
}

/// Loads the preferences file, creating a default one if none exists.
pub fn load_or_init() -> Result<CliPrefs> {
    let path = prefs_path()?;
    if !path.exists() {
        let default_prefs = CliPrefs::default();
        save(&default_prefs)?;
        return Ok(default_prefs);
    }
    let data = fs::read_to_string(&path)?;
    Ok(toml::from_str(&data)?)
}

pub fn save(prefs: &CliPrefs) -> Result<()> {
    let path = prefs_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, toml::to_string_pretty(prefs)?)?;
    Ok(())
}
