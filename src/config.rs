//! Configuration for host tools and dump locations
//!
//! Read from `$EXTRACT_UTILS_CONFIG` when set, otherwise from
//! `~/.extract-utils/config.toml`. Every section and key is optional.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable pointing at an explicit config file
pub const CONFIG_ENV: &str = "EXTRACT_UTILS_CONFIG";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub dump: DumpConfig,
}

/// Paths of the host binaries used during extraction
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_adb")]
    pub adb: String,

    #[serde(default = "default_debugfs")]
    pub debugfs: String,

    #[serde(default = "default_fsck_erofs")]
    pub fsck_erofs: String,
}

fn default_adb() -> String {
    "adb".to_string()
}

fn default_debugfs() -> String {
    "debugfs".to_string()
}

fn default_fsck_erofs() -> String {
    "fsck.erofs".to_string()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            adb: default_adb(),
            debugfs: default_debugfs(),
            fsck_erofs: default_fsck_erofs(),
        }
    }
}

/// Where dumps are placed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DumpConfig {
    /// Directory receiving partitions pulled over adb
    #[serde(default = "default_adb_dir")]
    pub adb_dir: PathBuf,
}

fn default_adb_dir() -> PathBuf {
    PathBuf::from("adb-dump")
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            adb_dir: default_adb_dir(),
        }
    }
}

/// Load configuration from an explicit file
pub fn load_config_file(config_path: &Path) -> Result<Config> {
    let config_str = std::fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;

    let config: Config = toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse {}", config_path.display()))?;

    Ok(config)
}

/// Locate the config file to use, if any
fn config_path() -> Option<PathBuf> {
    if let Ok(path) = env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }

    let home = match dirs::home_dir() {
        Some(h) => h,
        None => {
            log::debug!("Could not determine home directory");
            return None;
        }
    };

    let path = home.join(".extract-utils").join("config.toml");
    if path.exists() {
        Some(path)
    } else {
        log::debug!("No user config found at ~/.extract-utils/config.toml");
        None
    }
}

/// Load configuration, falling back to defaults when no file exists
pub fn load_config() -> Result<Config> {
    match config_path() {
        Some(path) => {
            log::debug!("Loading config from {}", path.display());
            load_config_file(&path)
        }
        None => Ok(Config::default()),
    }
}
