//! Server settings resolution tests
//!
//! Environment variables are process-global, so every test here is serial.

use serial_test::serial;
use std::env;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::{NamedTempFile, TempDir};
use weasel_ai::config::{load_config_logged, CliOverrides, ServerSettings};
use weasel_common::config::{env as keys, load_toml_config, TomlConfig};

const ALL_KEYS: &[&str] = &[
    keys::BIND,
    keys::STORAGE_CONNECTION_STRING,
    keys::CONTAINER_RAW,
    keys::CONTAINER_PROCESSED,
    keys::CONTAINER_BACKUPS,
    keys::LLM_API_KEY,
    keys::LLM_MODEL,
    keys::LLM_BASE_URL,
    keys::MAX_FILE_SIZE_MB,
];

fn clear_env() {
    for key in ALL_KEYS {
        env::remove_var(key);
    }
}

#[test]
#[serial]
fn test_defaults_without_any_source() {
    clear_env();
    let settings = ServerSettings::resolve(CliOverrides::default(), &TomlConfig::default());

    assert_eq!(settings.bind, "127.0.0.1:5780");
    assert_eq!(settings.containers.raw, "call-logs-raw");
    assert_eq!(settings.containers.processed, "call-logs-processed");
    assert_eq!(settings.containers.backups, "call-logs-backups");
    assert_eq!(settings.llm_api_key, None);
    assert_eq!(settings.llm_model, "claude-3-haiku-20240307");
    assert_eq!(settings.max_file_size_mb, 10);
    assert_eq!(settings.log_level, "info");
    assert!(settings.connection_string.starts_with("sqlite://"));
}

#[test]
#[serial]
fn test_cli_beats_env_beats_toml() {
    clear_env();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
bind = "10.0.0.1:1000"

[storage]
connection_string = "sqlite://toml.db"

[storage.containers]
raw = "toml-raw"

[upload]
max_file_size_mb = 5
"#
    )
    .unwrap();
    let toml = load_toml_config(file.path()).unwrap();

    env::set_var(keys::BIND, "10.0.0.2:2000");
    env::set_var(keys::CONTAINER_RAW, "env-raw");
    env::set_var(keys::MAX_FILE_SIZE_MB, "25");

    let settings = ServerSettings::resolve(
        CliOverrides {
            bind: Some("10.0.0.3:3000".into()),
            connection_string: None,
        },
        &toml,
    );
    clear_env();

    assert_eq!(settings.bind, "10.0.0.3:3000");
    assert_eq!(settings.connection_string, "sqlite://toml.db");
    assert_eq!(settings.containers.raw, "env-raw");
    assert_eq!(settings.containers.processed, "call-logs-processed");
    assert_eq!(settings.max_file_size_mb, 25);
}

#[test]
#[serial]
fn test_blank_api_key_counts_as_missing() {
    clear_env();
    env::set_var(keys::LLM_API_KEY, "   ");
    let mut toml = TomlConfig::default();
    toml.llm.api_key = Some("".into());

    let settings = ServerSettings::resolve(CliOverrides::default(), &toml);
    clear_env();

    assert_eq!(settings.llm_api_key, None);
}

#[test]
#[serial]
fn test_unparseable_env_size_falls_back() {
    clear_env();
    env::set_var(keys::MAX_FILE_SIZE_MB, "lots");
    let mut toml = TomlConfig::default();
    toml.upload.max_file_size_mb = Some(3);

    let settings = ServerSettings::resolve(CliOverrides::default(), &toml);
    clear_env();

    assert_eq!(settings.max_file_size_mb, 3);
}

/// In-memory log sink
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

#[test]
fn test_config_loading_is_logged_before_subscriber_init() {
    let dir = TempDir::new().unwrap();
    let logs = LogBuffer::default();
    let sink = logs.clone();

    let config = load_config_logged(&dir.path().join("absent.toml"), move || sink.clone()).unwrap();
    assert_eq!(config, TomlConfig::default());
    assert!(logs.contents().contains("Config file not found"), "logs: {}", logs.contents());

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "bind = \"0.0.0.0:9000\"").unwrap();
    let logs = LogBuffer::default();
    let sink = logs.clone();

    let config = load_config_logged(file.path(), move || sink.clone()).unwrap();
    assert_eq!(config.bind.as_deref(), Some("0.0.0.0:9000"));
    assert!(logs.contents().contains("Loaded configuration from"), "logs: {}", logs.contents());
}
