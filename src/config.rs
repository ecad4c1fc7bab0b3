use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::analysis::DEFAULT_API_BASE_URL;

/// Application-level constants
pub const APP_NAME: &str = "LedgerGuard";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Accepted per-request timeout range, in seconds.
pub const REQUEST_TIMEOUT_RANGE_SECS: std::ops::RangeInclusive<u64> = 15..=30;

/// Environment variable holding the completion service credential.
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Cannot read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings for the analysis core, supplied once at construction.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub api_base_url: String,
    /// Completion service credential. Never logged.
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub request_timeout_secs: u64,
    /// Attempts per completion call, first attempt included.
    pub max_attempts: u32,
    pub max_repair_retries: usize,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub rate_limit_requests: u32,
    pub rate_limit_window_secs: u64,
    /// Documents analyzed simultaneously in a batch.
    pub max_concurrency: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: String::new(),
            model: "llama-3.3-70b-versatile".to_string(),
            temperature: 0.1,
            request_timeout_secs: 30,
            max_attempts: 3,
            max_repair_retries: 2,
            backoff_base_ms: 1_000,
            backoff_max_ms: 30_000,
            rate_limit_requests: 3,
            rate_limit_window_secs: 60,
            max_concurrency: 2,
        }
    }
}

impl fmt::Debug for AnalyzerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_attempts", &self.max_attempts)
            .field("max_repair_retries", &self.max_repair_retries)
            .field("rate_limit_requests", &self.rate_limit_requests)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl AnalyzerConfig {
    /// Defaults overlaid with `GROQ_API_KEY` and `LEDGERGUARD_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay_env(|key| std::env::var(key).ok())
    }

    /// Read a JSON config file; absent fields keep their defaults. The
    /// credential still comes from the environment when the file omits it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.overlay_env(|key| std::env::var(key).ok())
    }

    fn overlay_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(key) = lookup(API_KEY_ENV).filter(|k| !k.trim().is_empty()) {
            self.api_key = key.trim().to_string();
        }
        if let Some(url) = lookup("LEDGERGUARD_API_BASE_URL") {
            self.api_base_url = url;
        }
        if let Some(model) = lookup("LEDGERGUARD_MODEL") {
            self.model = model;
        }
        if let Some(v) = lookup("LEDGERGUARD_TEMPERATURE") {
            self.temperature = parse_env("LEDGERGUARD_TEMPERATURE", &v)?;
        }
        if let Some(v) = lookup("LEDGERGUARD_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env("LEDGERGUARD_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("LEDGERGUARD_MAX_ATTEMPTS") {
            self.max_attempts = parse_env("LEDGERGUARD_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = lookup("LEDGERGUARD_MAX_REPAIR_RETRIES") {
            self.max_repair_retries = parse_env("LEDGERGUARD_MAX_REPAIR_RETRIES", &v)?;
        }
        if let Some(v) = lookup("LEDGERGUARD_RATE_LIMIT_PER_MINUTE") {
            self.rate_limit_requests = parse_env("LEDGERGUARD_RATE_LIMIT_PER_MINUTE", &v)?;
            self.rate_limit_window_secs = 60;
        }
        if let Some(v) = lookup("LEDGERGUARD_MAX_CONCURRENCY") {
            self.max_concurrency = parse_env("LEDGERGUARD_MAX_CONCURRENCY", &v)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "completion service credential not configured; set {API_KEY_ENV}"
            )));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model identifier is empty".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be within [0, 2], got {}",
                self.temperature
            )));
        }
        if !REQUEST_TIMEOUT_RANGE_SECS.contains(&self.request_timeout_secs) {
            return Err(ConfigError::Invalid(format!(
                "request timeout must be within 15..=30 seconds, got {}",
                self.request_timeout_secs
            )));
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".into()));
        }
        if self.rate_limit_requests == 0 || self.rate_limit_window_secs == 0 {
            return Err(ConfigError::Invalid(
                "rate limit needs a non-zero request count and window".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be at least 1".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid(format!("{key} has an invalid value '{value}'")))
}

/// `<config dir>/ledgerguard/config.json`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ledgerguard").join("config.json"))
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "ledgerguard=info,warn"
}
