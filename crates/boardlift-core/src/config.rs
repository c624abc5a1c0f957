use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORTAL_BASE_URL: &str = "https://xenforo.com";

/// Static facts about the installation being upgraded. Loaded once by the
/// driver and passed into the components that need them; there is no
/// ambient application global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardConfig {
    pub board_title: String,
    pub installed_version_id: u64,
    /// The live installation directory the final expansion writes into.
    pub install_dir: PathBuf,
    /// Root of durable storage (staged archives, expanded file sets,
    /// session state).
    pub data_dir: PathBuf,
    #[serde(default = "default_portal_base_url")]
    pub portal_base_url: String,
}

impl BoardConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed parsing board config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed reading board config: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("failed parsing board config: {}", path.display()))
    }
}

fn default_portal_base_url() -> String {
    DEFAULT_PORTAL_BASE_URL.to_string()
}
