//! Daemon configuration, loaded from `~/.keepalive/config.toml`.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use keepalive_host::DEFAULT_API_BASE_URL;
use keepalive_reconcile::{FirstObservationPolicy, ReconcileConfig};

use crate::error::{io_err, DaemonError};
use crate::paths::config_path;

pub const ENV_SWEEP_SECRET: &str = "KEEPALIVE_SWEEP_SECRET";
pub const ENV_API_BASE_URL: &str = "KEEPALIVE_API_BASE_URL";
pub const ENV_LOG_FORMAT: &str = "KEEPALIVE_LOG_FORMAT";

/// Line format of daemon log output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub api_base_url: String,
    /// Internal sweep timer period. 0 disables the timer; sweeps then only
    /// run when an external scheduler sends `sweep`.
    pub sweep_interval_secs: u64,
    pub call_timeout_secs: u64,
    pub commit_window: u8,
    pub max_concurrent_subjects: usize,
    pub first_observation: FirstObservationPolicy,
    /// Shared secret an external scheduler must present with `sweep`.
    pub sweep_secret: Option<String>,
    /// Per-subject check rate limit: burst tokens.
    pub rate_limit_burst: usize,
    /// Per-subject check rate limit: refill rate in requests per second.
    pub rate_limit_per_sec: f64,
    pub log_format: LogFormat,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            sweep_interval_secs: 300,
            call_timeout_secs: 15,
            commit_window: 5,
            max_concurrent_subjects: 4,
            first_observation: FirstObservationPolicy::default(),
            sweep_secret: None,
            rate_limit_burst: 100,
            rate_limit_per_sec: 100.0 / 60.0,
            log_format: LogFormat::Text,
        }
    }
}

impl DaemonConfig {
    /// Load `config.toml` under `home`, falling back to defaults when absent,
    /// then apply environment overrides and validate.
    pub fn load_at(home: &Path) -> Result<Self, DaemonError> {
        let path = config_path(home);
        let mut config = match fs::read_to_string(&path) {
            Ok(content) => toml::from_str::<DaemonConfig>(&content).map_err(|e| {
                DaemonError::Config {
                    path: path.clone(),
                    message: e.to_string(),
                }
            })?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                DaemonConfig::default()
            }
            Err(err) => return Err(io_err(&path, err)),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate().map_err(|message| DaemonError::Config { path, message })?;
        Ok(config)
    }

    /// Environment values win over the file. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secret) = lookup(ENV_SWEEP_SECRET).filter(|s| !s.is_empty()) {
            self.sweep_secret = Some(secret);
        }
        if let Some(url) = lookup(ENV_API_BASE_URL).filter(|s| !s.is_empty()) {
            self.api_base_url = url;
        }
        if let Some(raw) = lookup(ENV_LOG_FORMAT).filter(|s| !s.is_empty()) {
            match raw.parse() {
                Ok(format) => self.log_format = format,
                Err(message) => tracing::warn!(%message, "ignoring {}", ENV_LOG_FORMAT),
            }
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.api_base_url.trim().is_empty() {
            return Err("api_base_url must not be empty".to_string());
        }
        if self.call_timeout_secs == 0 {
            return Err("call_timeout_secs must be > 0".to_string());
        }
        if self.commit_window == 0 {
            return Err("commit_window must be > 0".to_string());
        }
        if self.max_concurrent_subjects == 0 {
            return Err("max_concurrent_subjects must be > 0".to_string());
        }
        if self.rate_limit_burst == 0 {
            return Err("rate_limit_burst must be > 0".to_string());
        }
        if !(self.rate_limit_per_sec.is_finite() && self.rate_limit_per_sec >= 0.0) {
            return Err("rate_limit_per_sec must be a non-negative number".to_string());
        }
        if self.sweep_secret.as_deref().is_some_and(str::is_empty) {
            tracing::warn!("sweep_secret is empty; external sweeps will be refused");
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            commit_window: self.commit_window,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            first_observation: self.first_observation,
            max_concurrent_subjects: self.max_concurrent_subjects,
        }
    }
}
