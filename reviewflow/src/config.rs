//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object or an empty environment
//! yields a working configuration. Values are read once at process start and
//! passed explicitly to the runner.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{Result, ReviewflowError};
use crate::execution_log::InProgressPolicy;
use crate::executor::{FailureMode, FailurePolicy};
use crate::job::{BackoffStrategy, JitterStrategy, RetryPolicy};

/// Prefix for every environment variable read by [`EngineConfig::from_env`].
pub const ENV_PREFIX: &str = "REVIEWFLOW_";

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of the human format.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// `max_retries` given to jobs that do not set their own.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    /// Base re-enqueue delay.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Cap on the re-enqueue delay.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// Backoff curve for re-enqueue delays.
    #[serde(default)]
    pub retry_backoff: BackoffStrategy,
    /// Jitter applied to re-enqueue delays.
    #[serde(default)]
    pub retry_jitter: JitterStrategy,
    /// Timeout used when a stage pauses without one.
    #[serde(default = "default_event_timeout_ms")]
    pub default_event_timeout_ms: u64,
    /// How often paused jobs are checked for expiry.
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
    /// Fatal/recoverable decision policy.
    #[serde(default)]
    pub failure_mode: FailureMode,
    /// Write-time handling of duplicate in-progress log entries.
    #[serde(default)]
    pub in_progress_policy: InProgressPolicy,
    /// Strategy used when a workflow type has none registered.
    #[serde(default)]
    pub default_strategy_mode: Option<String>,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_retry_base_delay_ms() -> u64 {
    1_000
}

const fn default_retry_max_delay_ms() -> u64 {
    60_000
}

const fn default_event_timeout_ms() -> u64 {
    300_000
}

const fn default_sweep_interval_ms() -> u64 {
    5_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_backoff: BackoffStrategy::default(),
            retry_jitter: JitterStrategy::default(),
            default_event_timeout_ms: default_event_timeout_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
            failure_mode: FailureMode::default(),
            in_progress_policy: InProgressPolicy::default(),
            default_strategy_mode: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON document. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewflowError::Config`] on malformed JSON or invalid values.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ReviewflowError::Config(format!("invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `REVIEWFLOW_*` environment variables.
    ///
    /// Recognised variables:
    /// - `REVIEWFLOW_MAX_RETRIES`
    /// - `REVIEWFLOW_RETRY_BASE_DELAY_MS`, `REVIEWFLOW_RETRY_MAX_DELAY_MS`
    /// - `REVIEWFLOW_RETRY_BACKOFF` (`exponential`, `linear`, `constant`)
    /// - `REVIEWFLOW_RETRY_JITTER` (`none`, `full`, `equal`)
    /// - `REVIEWFLOW_EVENT_TIMEOUT_MS`, `REVIEWFLOW_SWEEP_INTERVAL_MS`
    /// - `REVIEWFLOW_FAILURE_MODE` (`fail_fast`, `continue_on_failure`, `by_error_kind`)
    /// - `REVIEWFLOW_IN_PROGRESS_POLICY` (`read_time_tie_break`, `reject_duplicates`)
    /// - `REVIEWFLOW_STRATEGY_MODE`
    /// - `REVIEWFLOW_LOG_LEVEL`, `REVIEWFLOW_LOG_JSON`
    ///
    /// # Errors
    ///
    /// Returns [`ReviewflowError::Config`] if a set variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    ///
    /// `lookup` receives the full variable name including [`ENV_PREFIX`].
    ///
    /// # Errors
    ///
    /// Returns [`ReviewflowError::Config`] if a present value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut config = Self::default();

        if let Some(v) = var("MAX_RETRIES") {
            config.default_max_retries = parse_number("MAX_RETRIES", &v)?;
        }
        if let Some(v) = var("RETRY_BASE_DELAY_MS") {
            config.retry_base_delay_ms = parse_number("RETRY_BASE_DELAY_MS", &v)?;
        }
        if let Some(v) = var("RETRY_MAX_DELAY_MS") {
            config.retry_max_delay_ms = parse_number("RETRY_MAX_DELAY_MS", &v)?;
        }
        if let Some(v) = var("RETRY_BACKOFF") {
            config.retry_backoff = parse_enum("RETRY_BACKOFF", &v)?;
        }
        if let Some(v) = var("RETRY_JITTER") {
            config.retry_jitter = parse_enum("RETRY_JITTER", &v)?;
        }
        if let Some(v) = var("EVENT_TIMEOUT_MS") {
            config.default_event_timeout_ms = parse_number("EVENT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = var("SWEEP_INTERVAL_MS") {
            config.sweep_interval_ms = parse_number("SWEEP_INTERVAL_MS", &v)?;
        }
        if let Some(v) = var("FAILURE_MODE") {
            config.failure_mode = parse_enum("FAILURE_MODE", &v)?;
        }
        if let Some(v) = var("IN_PROGRESS_POLICY") {
            config.in_progress_policy = parse_enum("IN_PROGRESS_POLICY", &v)?;
        }
        if let Some(v) = var("STRATEGY_MODE") {
            config.default_strategy_mode = Some(v);
        }
        if let Some(v) = var("LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Some(v) = var("LOG_JSON") {
            config.logging.json = parse_bool("LOG_JSON", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Sets the default retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Sets the retry delay bounds.
    #[must_use]
    pub fn with_retry_delays(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.retry_base_delay_ms = base_ms;
        self.retry_max_delay_ms = max_ms;
        self
    }

    /// Sets the retry jitter.
    #[must_use]
    pub fn with_retry_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.retry_jitter = jitter;
        self
    }

    /// Sets the default pause timeout.
    #[must_use]
    pub fn with_event_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.default_event_timeout_ms = timeout_ms;
        self
    }

    /// Sets the timeout sweep interval.
    #[must_use]
    pub fn with_sweep_interval_ms(mut self, interval_ms: u64) -> Self {
        self.sweep_interval_ms = interval_ms;
        self
    }

    /// Sets the failure mode.
    #[must_use]
    pub fn with_failure_mode(mut self, mode: FailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Sets the in-progress policy.
    #[must_use]
    pub fn with_in_progress_policy(mut self, policy: InProgressPolicy) -> Self {
        self.in_progress_policy = policy;
        self
    }

    /// Sets the default strategy mode.
    #[must_use]
    pub fn with_default_strategy_mode(mut self, mode: impl Into<String>) -> Self {
        self.default_strategy_mode = Some(mode.into());
        self
    }

    /// Sets the logging configuration.
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReviewflowError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(ReviewflowError::Config(format!(
                "retry_max_delay_ms ({}) must be >= retry_base_delay_ms ({})",
                self.retry_max_delay_ms, self.retry_base_delay_ms
            )));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ReviewflowError::Config(
                "sweep_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.default_event_timeout_ms == 0 {
            return Err(ReviewflowError::Config(
                "default_event_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ReviewflowError::Config("logging.level cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Returns the re-enqueue backoff policy.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_base_delay_ms(self.retry_base_delay_ms)
            .with_max_delay_ms(self.retry_max_delay_ms)
            .with_backoff(self.retry_backoff)
            .with_jitter(self.retry_jitter)
    }

    /// Returns the executor failure policy for `failure_mode`.
    #[must_use]
    pub fn failure_policy(&self) -> FailurePolicy {
        FailurePolicy::new(self.failure_mode)
    }

    /// Returns the default pause timeout.
    #[must_use]
    pub fn default_event_timeout(&self) -> Duration {
        Duration::from_millis(self.default_event_timeout_ms)
    }

    /// Returns the sweep interval.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ReviewflowError::Config(format!("{ENV_PREFIX}{name}={value:?}: {e}")))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ReviewflowError::Config(format!(
            "{ENV_PREFIX}{name}={value:?}: expected a boolean"
        ))),
    }
}

fn parse_enum<T: DeserializeOwned>(name: &str, value: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_ascii_lowercase()))
        .map_err(|e| ReviewflowError::Config(format!("{ENV_PREFIX}{name}={value:?}: {e}")))
}
