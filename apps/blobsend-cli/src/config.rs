//! CLI configuration.
//!
//! Configuration is stored as TOML at `$XDG_CONFIG_HOME/blobsend/config.toml`
//! (falling back to `~/.config/blobsend/config.toml`). A missing default
//! file means built-in defaults; a missing `--config` file is an error.

use std::path::{Path, PathBuf};

use anyhow::Context;
use blobsend_upload::UploadConfig;
use serde::{Deserialize, Serialize};

/// Contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Upload tuning, the `[upload]` table.
    #[serde(default)]
    pub upload: UploadConfig,
}

impl CliConfig {
    /// Loads `explicit` if given, else the default file if it exists.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => match config_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: CliConfig = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

/// Returns the default configuration file path, if a home can be found.
fn config_path() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("blobsend").join("config.toml"))
}
