//! Optional TOML config for the watch command

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Defaults loadable from a TOML file; command-line flags always win.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    /// Settle delay in milliseconds
    #[serde(default)]
    pub delay_ms: Option<u64>,

    /// Directory for numbered copies
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))
    }
}
