use std::path::PathBuf;
use std::time::Duration;

use crate::inference::config::{PreprocessConfig, PreprocessConfigError};
use crate::inference::formatter::DEFAULT_TOP_K;

const DEFAULT_ALLOWED_ORIGINS: &[&str] = &["http://localhost:8501", "http://127.0.0.1:8501"];
const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_INFERENCE_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error(transparent)]
    Preprocess(#[from] PreprocessConfigError),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub require_origin: bool,
    pub model_path: Option<PathBuf>,
    pub labels_path: Option<PathBuf>,
    pub top_k: usize,
    pub max_concurrent_inferences: usize,
    pub inference_timeout: Duration,
    pub max_message_bytes: usize,
    pub preprocess_config_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect(),
            require_origin: false,
            model_path: None,
            labels_path: None,
            top_k: DEFAULT_TOP_K,
            max_concurrent_inferences: default_parallelism(),
            inference_timeout: Duration::from_secs(DEFAULT_INFERENCE_TIMEOUT_SECS),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            preprocess_config_path: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let allowed_origins = get("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .unwrap_or(defaults.allowed_origins);

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", get("PORT"), defaults.port)?,
            allowed_origins,
            require_origin: parse_bool("REQUIRE_ORIGIN", get("REQUIRE_ORIGIN"), defaults.require_origin)?,
            model_path: get("MODEL_PATH").map(PathBuf::from),
            labels_path: get("LABELS_PATH").map(PathBuf::from),
            top_k: positive("TOP_K", get("TOP_K"), defaults.top_k)?,
            max_concurrent_inferences: positive(
                "MAX_CONCURRENT_INFERENCES",
                get("MAX_CONCURRENT_INFERENCES"),
                defaults.max_concurrent_inferences,
            )?,
            inference_timeout: Duration::from_secs(positive(
                "INFERENCE_TIMEOUT_SECS",
                get("INFERENCE_TIMEOUT_SECS"),
                DEFAULT_INFERENCE_TIMEOUT_SECS,
            )?),
            max_message_bytes: positive(
                "MAX_MESSAGE_BYTES",
                get("MAX_MESSAGE_BYTES"),
                defaults.max_message_bytes,
            )?,
            preprocess_config_path: get("PREPROCESS_CONFIG").map(PathBuf::from),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn load_preprocess(&self) -> Result<PreprocessConfig, ConfigError> {
        match &self.preprocess_config_path {
            Some(path) => Ok(PreprocessConfig::load(path)?),
            None => Ok(PreprocessConfig::default()),
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}

fn positive<T>(key: &'static str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let raw = value.clone();
    let parsed = parse_or(key, value, default)?;
    if parsed <= T::default() {
        return Err(ConfigError::InvalidValue {
            key,
            value: raw.unwrap_or_default(),
        });
    }
    Ok(parsed)
}

fn parse_bool(key: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::InvalidValue {
            key,
            value: value.unwrap_or_default(),
        }),
    }
}
