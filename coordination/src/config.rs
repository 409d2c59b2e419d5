//! Dispatch configuration
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (e.g. `DISPATCH_RESPONSE_WINDOW_MINUTES`)
//! 2. Values from the TOML config file
//! 3. Built-in defaults
//!
//! ```toml
//! response_window_minutes = 15
//! supervisors = ["100200300"]
//! call_timeout_secs = 10
//! delivery_retries = 0
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::RecipientId;

const DEFAULT_RESPONSE_WINDOW_MINUTES: f64 = 15.0;
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

const ENV_RESPONSE_WINDOW_MINUTES: &str = "DISPATCH_RESPONSE_WINDOW_MINUTES";
const ENV_SUPERVISORS: &str = "DISPATCH_SUPERVISORS";
const ENV_CALL_TIMEOUT_SECS: &str = "DISPATCH_CALL_TIMEOUT_SECS";
const ENV_DELIVERY_RETRIES: &str = "DISPATCH_DELIVERY_RETRIES";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Settings consumed by the escalation scheduler and dispatcher
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// How long a candidate has to answer a proposal, in minutes (fractional allowed)
    pub response_window_minutes: f64,
    /// Recipients told about the final outcome
    pub supervisors: Vec<RecipientId>,
    /// Upper bound on any single notification channel call
    pub call_timeout_secs: u64,
    /// Extra delivery attempts on a transient error before skipping a candidate.
    /// A call that ran past `call_timeout_secs` is never retried.
    pub delivery_retries: u32,
    /// Pause between delivery attempts
    pub retry_backoff_ms: u64,
    /// Allow more than one job to escalate at the same time
    pub allow_concurrent_jobs: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            response_window_minutes: DEFAULT_RESPONSE_WINDOW_MINUTES,
            supervisors: Vec::new(),
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            delivery_retries: 0,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            allow_concurrent_jobs: false,
        }
    }
}

impl DispatchConfig {
    /// Parse a TOML document; missing keys fall back to defaults
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Load from file, apply environment overrides, then validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `DISPATCH_*` environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_RESPONSE_WINDOW_MINUTES) {
            self.response_window_minutes =
                raw.trim().parse().map_err(|_| ConfigError::Invalid {
                    key: ENV_RESPONSE_WINDOW_MINUTES,
                    message: format!("not a number: {raw:?}"),
                })?;
        }
        if let Some(raw) = lookup(ENV_SUPERVISORS) {
            self.supervisors = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(RecipientId::from)
                .collect();
        }
        if let Some(raw) = lookup(ENV_CALL_TIMEOUT_SECS) {
            self.call_timeout_secs = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: ENV_CALL_TIMEOUT_SECS,
                message: format!("not an integer: {raw:?}"),
            })?;
        }
        if let Some(raw) = lookup(ENV_DELIVERY_RETRIES) {
            self.delivery_retries = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: ENV_DELIVERY_RETRIES,
                message: format!("not an integer: {raw:?}"),
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.response_window()?;
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "call_timeout_secs",
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Response window converted to a `Duration`.
    ///
    /// Rejects non-finite, non-positive and out-of-range values instead of
    /// wrapping or saturating.
    pub fn response_window(&self) -> Result<Duration, ConfigError> {
        let minutes = self.response_window_minutes;
        if !minutes.is_finite() || minutes <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "response_window_minutes",
                message: format!("must be a positive number of minutes, got {minutes}"),
            });
        }
        Duration::try_from_secs_f64(minutes * 60.0).map_err(|e| ConfigError::Invalid {
            key: "response_window_minutes",
            message: format!("{minutes} minutes is out of range: {e}"),
        })
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}
