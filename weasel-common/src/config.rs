//! Bootstrap configuration loading
//!
//! Settings resolve in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Command-line and environment handling live in each binary (clap `env`
//! attributes); this module owns the TOML layer and the compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_BIND: &str = "127.0.0.1:5780";
pub const DEFAULT_RAW_CONTAINER: &str = "call-logs-raw";
pub const DEFAULT_PROCESSED_CONTAINER: &str = "call-logs-processed";
pub const DEFAULT_BACKUPS_CONTAINER: &str = "call-logs-backups";
pub const DEFAULT_LLM_MODEL: &str = "claude-3-haiku-20240307";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 10;

/// Environment variable names
pub mod env {
    pub const CONFIG: &str = "WEASEL_CONFIG";
    pub const BIND: &str = "WEASEL_BIND";
    pub const STORAGE_CONNECTION_STRING: &str = "WEASEL_STORAGE_CONNECTION_STRING";
    pub const CONTAINER_RAW: &str = "WEASEL_CONTAINER_RAW";
    pub const CONTAINER_PROCESSED: &str = "WEASEL_CONTAINER_PROCESSED";
    pub const CONTAINER_BACKUPS: &str = "WEASEL_CONTAINER_BACKUPS";
    pub const LLM_API_KEY: &str = "ANTHROPIC_API_KEY";
    pub const LLM_MODEL: &str = "WEASEL_LLM_MODEL";
    pub const LLM_BASE_URL: &str = "WEASEL_LLM_BASE_URL";
    pub const MAX_FILE_SIZE_MB: &str = "MAX_FILE_SIZE_MB";
}

/// Bootstrap configuration loaded from TOML file
///
/// Every field is optional; missing sections fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// HTTP bind address (host:port)
    pub bind: Option<String>,
    pub storage: StorageSection,
    pub llm: LlmSection,
    pub upload: UploadSection,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub connection_string: Option<String>,
    pub containers: ContainerNames,
}

/// Container names as configured (any may be left unset)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerNames {
    pub raw: Option<String>,
    pub processed: Option<String>,
    pub backups: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSection {
    pub max_file_size_mb: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Load the TOML config file.
///
/// A missing file is not an error: a warning is logged and defaults are used.
/// A present-but-malformed file is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file not found at {}, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Default config file location: `<config_dir>/weasel/weasel-ai.toml`
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("weasel")
        .join("weasel-ai.toml")
}

/// OS-dependent data folder holding the blob database
pub fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("weasel"))
        .unwrap_or_else(|| PathBuf::from("./weasel_data"))
}

/// Default SQLite connection string for the blob store
pub fn default_connection_string() -> String {
    format!(
        "sqlite://{}?mode=rwc",
        default_data_folder().join("blobs.db").display()
    )
}

/// First value present in priority order, else the compiled default
pub fn resolve<T>(cli: Option<T>, env_name: &str, toml: Option<T>, default: T) -> T
where
    T: std::str::FromStr,
{
    if let Some(v) = cli {
        return v;
    }
    if let Some(v) = env_value(env_name) {
        return v;
    }
    toml.unwrap_or(default)
}

/// Optional variant of [`resolve`] for settings without a default
pub fn resolve_optional<T>(cli: Option<T>, env_name: &str, toml: Option<T>) -> Option<T>
where
    T: std::str::FromStr,
{
    cli.or_else(|| env_value(env_name)).or(toml)
}

/// Read and parse an environment variable; blank or unparseable values are ignored
fn env_value<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring unparseable value for {}", name);
            None
        }
    }
}
