use std::path::{Path, PathBuf};
use std::{env, fs};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use toml::{Table, Value};
use tracing_subscriber::EnvFilter;

pub type AppConfig = SubtitleConfig;

const CONFIG_PREFIX: &str = "SUBTITLE_SERVICE";
const CONFIG_DIR: &str = "config";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(#[from] toml::de::Error),

    #[error("invalid value for {key}: {message}")]
    Value { key: &'static str, message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubtitleConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_true")]
    pub ansi: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub audio: GrpcEndpointConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrpcEndpointConfig {
    #[serde(default = "default_grpc_host")]
    pub host: String,
    #[serde(default = "default_grpc_port")]
    pub port: u16,
    #[serde(default)]
    pub tls_enabled: bool,
    #[serde(default = "default_grpc_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_grpc_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_grpc_max_message_bytes")]
    pub max_decoding_message_bytes: usize,
    #[serde(default = "default_grpc_max_message_bytes")]
    pub max_encoding_message_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    #[serde(default = "default_transcription_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_transcription_model")]
    pub model: String,
    #[serde(default = "default_transcription_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Size of each video chunk sent on the extraction stream.
    #[serde(default = "default_chunk_size_bytes")]
    pub chunk_size_bytes: i64,
    /// Upper bound for one whole `generate` call. Unbounded when unset.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            ansi: default_true(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size_bytes: default_chunk_size_bytes(),
            deadline_ms: None,
        }
    }
}

impl Default for GrpcEndpointConfig {
    fn default() -> Self {
        Self {
            host: default_grpc_host(),
            port: default_grpc_port(),
            tls_enabled: false,
            connect_timeout_ms: default_grpc_connect_timeout_ms(),
            request_timeout_ms: default_grpc_request_timeout_ms(),
            max_decoding_message_bytes: default_grpc_max_message_bytes(),
            max_encoding_message_bytes: default_grpc_max_message_bytes(),
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            base_url: default_transcription_base_url(),
            api_key: String::new(),
            model: default_transcription_model(),
            request_timeout_ms: default_transcription_request_timeout_ms(),
        }
    }
}

impl GrpcEndpointConfig {
    pub fn uri(&self) -> String {
        let scheme = if self.tls_enabled { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

/// Loads `config/default.toml`, then `config/{RUN_ENV}.toml`, then
/// `SUBTITLE_SERVICE_*` environment overrides. Missing files are skipped.
pub fn load_config() -> Result<SubtitleConfig, ConfigError> {
    let mut merged = Table::new();
    merge_file(&mut merged, &Path::new(CONFIG_DIR).join("default.toml"), false)?;
    if let Ok(run_env) = env::var("RUN_ENV") {
        merge_file(&mut merged, &Path::new(CONFIG_DIR).join(format!("{run_env}.toml")), false)?;
    }
    finish(merged)
}

/// Loads a single explicit file plus environment overrides.
pub fn load_config_from(path: &Path) -> Result<SubtitleConfig, ConfigError> {
    let mut merged = Table::new();
    merge_file(&mut merged, path, true)?;
    finish(merged)
}

pub fn setup_logging(config: &SubtitleConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new(default_log_level()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.logging.ansi)
        .with_writer(std::io::stderr)
        .try_init();
}

fn finish(mut merged: Table) -> Result<SubtitleConfig, ConfigError> {
    apply_env_overrides(&mut merged, env::vars());
    let mut config: SubtitleConfig = Value::Table(merged).try_into()?;
    if config.service.transcription.api_key.is_empty() {
        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            config.service.transcription.api_key = api_key;
        }
    }
    validate(&config)?;
    Ok(config)
}

fn validate(config: &SubtitleConfig) -> Result<(), ConfigError> {
    let chunk_size = config.service.pipeline.chunk_size_bytes;
    if chunk_size <= 0 {
        return Err(ConfigError::Value {
            key: "service.pipeline.chunk_size_bytes",
            message: format!("must be greater than zero, got {chunk_size}"),
        });
    }
    Ok(())
}

fn merge_file(merged: &mut Table, path: &Path, required: bool) -> Result<(), ConfigError> {
    if !required && !path.exists() {
        return Ok(());
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let table: Table = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    merge_tables(merged, table);
    Ok(())
}

fn merge_tables(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match value {
            Value::Table(incoming) => match base.get_mut(&key) {
                Some(Value::Table(existing)) => merge_tables(existing, incoming),
                _ => {
                    base.insert(key, Value::Table(incoming));
                }
            },
            value => {
                base.insert(key, value);
            }
        }
    }
}

/// `SUBTITLE_SERVICE_SERVICE__AUDIO__PORT=9000` sets `service.audio.port`.
fn apply_env_overrides(merged: &mut Table, vars: impl Iterator<Item = (String, String)>) {
    let prefix = format!("{CONFIG_PREFIX}_");
    for (name, raw) in vars {
        let Some(path) = name.strip_prefix(&prefix) else {
            continue;
        };
        let keys: Vec<String> = path.split("__").map(str::to_ascii_lowercase).collect();
        if keys.iter().any(String::is_empty) {
            continue;
        }
        set_path(merged, &keys, parse_env_value(&raw));
    }
}

fn set_path(table: &mut Table, keys: &[String], value: Value) {
    let Some((last, parents)) = keys.split_last() else {
        return;
    };
    let mut current = table;
    for key in parents {
        let entry = current
            .entry(key.clone())
            .or_insert(Value::Table(Table::new()));
        if !entry.is_table() {
            *entry = Value::Table(Table::new());
        }
        let Value::Table(next) = entry else {
            return;
        };
        current = next;
    }
    current.insert(last.clone(), value);
}

fn parse_env_value(raw: &str) -> Value {
    if let Ok(value) = raw.parse::<bool>() {
        return Value::Boolean(value);
    }
    if let Ok(value) = raw.parse::<i64>() {
        return Value::Integer(value);
    }
    Value::String(raw.to_string())
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_grpc_host() -> String {
    "127.0.0.1".to_string()
}

fn default_grpc_port() -> u16 {
    50051
}

fn default_grpc_connect_timeout_ms() -> u64 {
    3_000
}

fn default_grpc_request_timeout_ms() -> u64 {
    300_000
}

fn default_grpc_max_message_bytes() -> usize {
    64 * 1024 * 1024
}

fn default_chunk_size_bytes() -> i64 {
    3 * 1024 * 1024
}

fn default_transcription_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_transcription_request_timeout_ms() -> u64 {
    120_000
}
