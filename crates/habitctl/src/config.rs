//! Configuration for habitctl.
//!
//! Loads settings from TOML. Lookup order: explicit `--config` path,
//! `$HABITLEDGER_CONFIG`, `<config_dir>/habitledger/config.toml`, then
//! built-in defaults. Every field has a default.

use crate::detector::DetectorConfig;
use crate::llm_client::LlmConfig;
use crate::orchestrator::CoachConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming a config file
pub const CONFIG_ENV: &str = "HABITLEDGER_CONFIG";

/// Placeholder printed instead of secrets
pub const REDACTED: &str = "<redacted>";

/// Directory name under the platform config/data dirs
pub const APP_DIR: &str = "habitledger";

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one JSON file per user
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join("users")
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Alternative principles file; the bundled set is used when unset
    pub knowledge_base: Option<PathBuf>,
    pub llm: LlmConfig,
    pub detector: DetectorConfig,
    pub coach: CoachConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
    }

    /// Resolve and load configuration.
    ///
    /// An explicitly named file (flag or env) must exist and parse; the
    /// default location falls back to defaults when missing.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            return Self::load_from_path(Path::new(&path));
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => {
                warn!("Config not found, using defaults");
                Ok(Config::default())
            }
        }
    }

    /// Load config from specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Copy safe to print: secrets replaced
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if config.llm.api_key.is_some() {
            config.llm.api_key = Some(REDACTED.to_string());
        }
        config
    }

    /// Default config rendered as TOML
    pub fn default_toml() -> Result<String> {
        Ok(toml::to_string_pretty(&Config::default())?)
    }
}
