use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::dispatch::{DEFAULT_POLL_INTERVAL, DEFAULT_QUEUE_CAPACITY};
use crate::generator::{DEFAULT_API_BASE, DEFAULT_MODEL};

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const CONFIG_PATH_ENV: &str = "PUREAGI_CONFIG";

const DEFAULT_MEMORY_FILE: &str = "chat_memory.csv";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;
const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_HTTP_MAX_CONC: usize = 1024;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ModelSection {
    /// Gemini model id, e.g. `gemini-1.5-pro-latest`
    #[serde(default)]
    pub name: Option<String>,
    /// Base URL of the Generative Language API
    #[serde(default)]
    pub api_base: Option<String>,
    /// Whole-request timeout for a model call, in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct AgentSection {
    /// Idle wait of the dispatch worker before it re-checks for shutdown
    #[serde(default)]
    pub poll_interval_ms: Option<u64>,
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct StorageSection {
    /// CSV file receiving one row per exchange
    #[serde(default)]
    pub memory_file: Option<String>,
    /// Directory for temporary attachment files
    #[serde(default)]
    pub upload_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Serve the browser chat widget
    #[serde(default)]
    pub ui_enabled: Option<bool>,
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    #[serde(default)]
    pub max_upload_bytes: Option<usize>,
}

/// On-disk configuration (TOML). The API key is only ever read from the environment.
#[derive(Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub model: ModelSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub server: ServerSection,
}

static CONFIG_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    let schema = schemars::schema_for!(FileConfig);
    let schema_value = serde_json::to_value(&schema).expect("schema value");
    validator_for(&schema_value).expect("valid schema")
});

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("GEMINI_API_KEY environment variable not set.")]
    MissingApiKey,
    #[error("invalid {key}: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },
    #[error("config file {path} failed validation: {errors}")]
    Schema { path: String, errors: String },
}

/// JSON schema of the TOML config file.
///
/// # Panics
///
/// Panics if schema generation fails; this indicates a programming error.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(FileConfig);
    serde_json::to_value(&schema).expect("schema json")
}

pub fn write_schema_file(path: &str) -> std::io::Result<()> {
    let schema_json = config_schema_json();
    std::fs::write(path, serde_json::to_string_pretty(&schema_json)?)
}

pub fn load_config_file(path: &str) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_string(),
        source,
    })?;
    let parse_err = |e: &dyn std::fmt::Display| ConfigError::Parse {
        path: path.to_string(),
        message: e.to_string(),
    };
    let raw: toml::Value = toml::from_str(&content).map_err(|e| parse_err(&e))?;
    let json_value = serde_json::to_value(&raw).map_err(|e| parse_err(&e))?;
    let validation_errors: Vec<_> = CONFIG_SCHEMA
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !validation_errors.is_empty() {
        return Err(ConfigError::Schema {
            path: path.to_string(),
            errors: validation_errors.join(", "),
        });
    }
    toml::from_str(&content).map_err(|e| parse_err(&e))
}

/// Effective settings after merging defaults, the optional config file and
/// the environment (highest precedence).
#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
    pub model_timeout: Duration,
    pub memory_file: PathBuf,
    pub upload_dir: PathBuf,
    pub poll_interval: Duration,
    pub queue_capacity: usize,
    pub bind: String,
    pub port: u16,
    pub ui_enabled: bool,
    pub http_max_conc: usize,
    pub max_upload_bytes: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("model_timeout", &self.model_timeout)
            .field("memory_file", &self.memory_file)
            .field("upload_dir", &self.upload_dir)
            .field("poll_interval", &self.poll_interval)
            .field("queue_capacity", &self.queue_capacity)
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("ui_enabled", &self.ui_enabled)
            .field("http_max_conc", &self.http_max_conc)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

impl Config {
    /// Read `PUREAGI_CONFIG` (if set) and the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let file = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => load_config_file(path.trim())?,
            _ => FileConfig::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    pub fn resolve<F>(file: FileConfig, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| {
            env(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = lookup(API_KEY_ENV).ok_or(ConfigError::MissingApiKey)?;

        let model = lookup("PUREAGI_MODEL")
            .or(file.model.name)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_base = lookup("PUREAGI_API_BASE")
            .or(file.model.api_base)
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let timeout_secs = parse_env(&lookup, "PUREAGI_HTTP_TIMEOUT_SECS")?
            .or(file.model.timeout_secs)
            .unwrap_or(DEFAULT_MODEL_TIMEOUT_SECS)
            .max(1);

        let memory_file = lookup("PUREAGI_MEMORY_FILE")
            .or(file.storage.memory_file)
            .unwrap_or_else(|| DEFAULT_MEMORY_FILE.to_string());
        let upload_dir = lookup("PUREAGI_UPLOAD_DIR")
            .or(file.storage.upload_dir)
            .unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string());

        let poll_interval = parse_env(&lookup, "PUREAGI_POLL_INTERVAL_MS")?
            .or(file.agent.poll_interval_ms)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        if poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                key: "PUREAGI_POLL_INTERVAL_MS",
                value: "0".into(),
            });
        }
        let queue_capacity = parse_env(&lookup, "PUREAGI_QUEUE_CAPACITY")?
            .or(file.agent.queue_capacity)
            .unwrap_or(DEFAULT_QUEUE_CAPACITY)
            .max(1);

        let bind = lookup("PUREAGI_BIND")
            .or(file.server.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let port = parse_env(&lookup, "PUREAGI_PORT")?
            .or(file.server.port)
            .unwrap_or(DEFAULT_PORT);
        let ui_enabled = match lookup("PUREAGI_UI_ENABLE") {
            Some(raw) => parse_flag(&raw).ok_or(ConfigError::Invalid {
                key: "PUREAGI_UI_ENABLE",
                value: raw,
            })?,
            None => file.server.ui_enabled.unwrap_or(false),
        };
        let http_max_conc = parse_env(&lookup, "PUREAGI_HTTP_MAX_CONC")?
            .or(file.server.max_concurrency)
            .unwrap_or(DEFAULT_HTTP_MAX_CONC)
            .max(1);
        let max_upload_bytes = parse_env(&lookup, "PUREAGI_MAX_UPLOAD_BYTES")?
            .or(file.server.max_upload_bytes)
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);

        Ok(Self {
            api_key,
            model,
            api_base,
            model_timeout: Duration::from_secs(timeout_secs),
            memory_file: PathBuf::from(memory_file),
            upload_dir: PathBuf::from(upload_dir),
            poll_interval,
            queue_capacity,
            bind,
            port,
            ui_enabled,
            http_max_conc,
            max_upload_bytes,
        })
    }

    pub fn addr(&self) -> Result<std::net::SocketAddr, ConfigError> {
        let raw = if self.bind.contains(':') && !self.bind.starts_with('[') {
            format!("[{}]:{}", self.bind, self.port)
        } else {
            format!("{}:{}", self.bind, self.port)
        };
        raw.parse().map_err(|_| ConfigError::Invalid {
            key: "PUREAGI_BIND",
            value: self.bind.clone(),
        })
    }
}

fn parse_env<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|_| ConfigError::Invalid { key, value: raw })
        })
        .transpose()
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
