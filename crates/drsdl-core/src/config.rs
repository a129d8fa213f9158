//! Global configuration: concurrency bounds, default part size, and the
//! requester-pays billing project, loaded from `~/.config/drsdl/config.toml`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Placeholder egress rate used only to print an estimate line (§9 open
/// question: no real pricing table is implemented).
pub const COST_PER_GB_PLACEHOLDER: f64 = 0.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bound on concurrent `resolve` calls (§4.4 Phase A).
    pub max_retrievers: usize,
    /// Bound on concurrent `sign` calls per re-sign chunk (§4.4 Phase D).
    pub max_signers: usize,
    /// Bound on concurrent objects downloading at once (§4.4 Phase D).
    pub max_downloaders: usize,
    /// Bound on concurrent part fetches within one object (§4.2, §5).
    pub max_part_handlers: usize,
    /// Default part size in bytes, used unless the workload-shaping table
    /// (§4.2) or a `--part-size` override picks a different one.
    pub default_part_size: u64,
    /// Billing project passed to `sign` for requester-pays objects, unless
    /// overridden on the command line.
    pub billing_project: Option<String>,
    /// Reserved for a future strict-cleanup-on-failure mode (§9 open
    /// question); unused by this version.
    pub cleanup_on_failure: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retrievers: 100,
            max_signers: 10,
            max_downloaders: 10,
            max_part_handlers: 8,
            default_part_size: 64 * 1024 * 1024,
            billing_project: None,
            cleanup_on_failure: false,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("drsdl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Loads configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<Config> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = Config::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: Config = toml::from_str(&data)?;
    Ok(cfg)
}

/// Loads configuration from an explicit path (the `--config` override),
/// without falling back to defaults if the file is missing.
pub fn load_from(path: &std::path::Path) -> Result<Config> {
    let data = fs::read_to_string(path)?;
    Ok(toml::from_str(&data)?)
}
