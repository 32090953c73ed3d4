//! Server settings resolution for weasel-ai
//!
//! Priority: command-line → environment → TOML → compiled default.

use std::path::Path;
use tracing_subscriber::fmt::MakeWriter;
use weasel_common::config::{
    self as common_config, env, load_toml_config, resolve, resolve_optional, TomlConfig,
    DEFAULT_BIND, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL, DEFAULT_MAX_FILE_SIZE_MB,
};

use crate::storage::Containers;

/// Load the TOML config with an info-level subscriber active for the call
///
/// The configured log level comes from this file, so the real subscriber is
/// installed afterwards.
pub fn load_config_logged<W>(path: &Path, make_writer: W) -> weasel_common::Result<TomlConfig>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let bootstrap = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(make_writer)
        .finish();
    tracing::subscriber::with_default(bootstrap, || load_toml_config(path))
}

/// Fully resolved settings the server starts with
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub bind: String,
    pub connection_string: String,
    pub containers: Containers,
    pub llm_api_key: Option<String>,
    pub llm_model: String,
    pub llm_base_url: String,
    pub max_file_size_mb: u64,
    pub log_level: String,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind: Option<String>,
    pub connection_string: Option<String>,
}

impl ServerSettings {
    pub fn resolve(cli: CliOverrides, toml: &TomlConfig) -> Self {
        let defaults = Containers::default();
        let containers = Containers {
            raw: resolve(None, env::CONTAINER_RAW, toml.storage.containers.raw.clone(), defaults.raw),
            processed: resolve(
                None,
                env::CONTAINER_PROCESSED,
                toml.storage.containers.processed.clone(),
                defaults.processed,
            ),
            backups: resolve(
                None,
                env::CONTAINER_BACKUPS,
                toml.storage.containers.backups.clone(),
                defaults.backups,
            ),
        };

        let llm_api_key = resolve_optional(None, env::LLM_API_KEY, toml.llm.api_key.clone())
            .filter(|k: &String| !k.trim().is_empty());

        Self {
            bind: resolve(cli.bind, env::BIND, toml.bind.clone(), DEFAULT_BIND.to_string()),
            connection_string: resolve(
                cli.connection_string,
                env::STORAGE_CONNECTION_STRING,
                toml.storage.connection_string.clone(),
                common_config::default_connection_string(),
            ),
            containers,
            llm_api_key,
            llm_model: resolve(None, env::LLM_MODEL, toml.llm.model.clone(), DEFAULT_LLM_MODEL.to_string()),
            llm_base_url: resolve(
                None,
                env::LLM_BASE_URL,
                toml.llm.base_url.clone(),
                DEFAULT_LLM_BASE_URL.to_string(),
            ),
            max_file_size_mb: resolve(
                None,
                env::MAX_FILE_SIZE_MB,
                toml.upload.max_file_size_mb,
                DEFAULT_MAX_FILE_SIZE_MB,
            ),
            log_level: toml.logging.level.clone(),
        }
    }

    /// Log the effective settings (never the API key itself)
    pub fn log_summary(&self) {
        tracing::info!(bind = %self.bind, "HTTP bind address");
        tracing::info!(storage = %self.connection_string, "Blob store");
        tracing::info!(
            raw = %self.containers.raw,
            processed = %self.containers.processed,
            backups = %self.containers.backups,
            "Containers"
        );
        tracing::info!(base_url = %self.llm_base_url, "Language model endpoint");
        if self.llm_api_key.is_none() {
            tracing::warn!("{} not set; uploads are accepted but analyses will fail", env::LLM_API_KEY);
        }
        tracing::info!(max_file_size_mb = self.max_file_size_mb, "Upload limit");
    }
}
