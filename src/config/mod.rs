//! Configuration for safe calls.
//!
//! A [`SafeCallConfig`] is fixed when its [`SafeCall`](crate::SafeCall) is
//! built. It can be assembled with [`SafeCallConfig::builder`] or read from
//! `SAFECALL_*` environment variables.

use std::time::Duration;

use crate::backend::Parameters;
use crate::errors::{SafeCallError, SafeCallResult};
use crate::resilience::{CircuitBreakerConfig, RetryConfig};

/// Default per-invocation timeout (20 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default consecutive failures before the circuit opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Settings of one `SafeCall` instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SafeCallConfig {
    /// Timeout applied to each backend invocation.
    pub timeout: Duration,
    /// Retry policy around each backend call.
    pub retry: RetryConfig,
    /// Whether prompts and responses are moderated.
    pub moderation: bool,
    /// Redactor identifiers, applied in order.
    pub redactors: Vec<String>,
    /// Provider parameters passed through to the backend.
    pub parameters: Parameters,
    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for SafeCallConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: RetryConfig::default().max_retries(DEFAULT_MAX_RETRIES),
            moderation: true,
            redactors: Vec::new(),
            parameters: Parameters::new(),
            circuit_breaker: CircuitBreakerConfig::default()
                .failure_threshold(DEFAULT_FAILURE_THRESHOLD),
        }
    }
}

impl SafeCallConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> SafeCallConfigBuilder {
        SafeCallConfigBuilder::new()
    }

    /// Creates a configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `SAFECALL_TIMEOUT`: per-invocation timeout in seconds
    /// - `SAFECALL_MAX_RETRIES`: retries after the first attempt
    /// - `SAFECALL_MODERATION`: `true`, `false`, `1` or `0`
    /// - `SAFECALL_REDACT`: comma-separated redactor identifiers
    /// - `SAFECALL_CIRCUIT_THRESHOLD`: failures before the circuit opens
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SafeCallError::Configuration`] if a variable is set but
    /// cannot be parsed, or the result fails validation.
    pub fn from_env() -> SafeCallResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> SafeCallResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = SafeCallConfigBuilder::new();

        if let Some(value) = lookup("SAFECALL_TIMEOUT") {
            let secs = parse_var::<f64>("SAFECALL_TIMEOUT", &value)?;
            let timeout = Duration::try_from_secs_f64(secs).map_err(|_| {
                SafeCallError::configuration(format!("SAFECALL_TIMEOUT out of range: {value}"))
            })?;
            builder = builder.timeout(timeout);
        }

        if let Some(value) = lookup("SAFECALL_MAX_RETRIES") {
            builder = builder.max_retries(parse_var("SAFECALL_MAX_RETRIES", &value)?);
        }

        if let Some(value) = lookup("SAFECALL_MODERATION") {
            builder = builder.moderation(parse_flag("SAFECALL_MODERATION", &value)?);
        }

        if let Some(value) = lookup("SAFECALL_REDACT") {
            builder = builder.redactors(
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(String::from),
            );
        }

        if let Some(value) = lookup("SAFECALL_CIRCUIT_THRESHOLD") {
            builder =
                builder.failure_threshold(parse_var("SAFECALL_CIRCUIT_THRESHOLD", &value)?);
        }

        builder.build()
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> SafeCallResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SafeCallError::configuration(format!("Invalid value for {name}: {value}")))
}

fn parse_flag(name: &str, value: &str) -> SafeCallResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(SafeCallError::configuration(format!(
            "Invalid value for {name}: {value}"
        ))),
    }
}

/// Builder for `SafeCallConfig`.
#[derive(Debug, Clone, Default)]
pub struct SafeCallConfigBuilder {
    config: SafeCallConfig,
}

impl From<SafeCallConfig> for SafeCallConfigBuilder {
    fn from(config: SafeCallConfig) -> Self {
        Self { config }
    }
}

impl SafeCallConfigBuilder {
    /// Creates a builder holding the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-invocation timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the timeout in seconds.
    pub fn timeout_secs(self, secs: u64) -> Self {
        self.timeout(Duration::from_secs(secs))
    }

    /// Sets the number of retries after the first attempt.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.retry.max_retries = max_retries;
        self
    }

    /// Replaces the whole retry configuration.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Enables or disables moderation.
    pub fn moderation(mut self, enabled: bool) -> Self {
        self.config.moderation = enabled;
        self
    }

    /// Appends a redactor identifier.
    pub fn redact(mut self, id: impl Into<String>) -> Self {
        self.config.redactors.push(id.into());
        self
    }

    /// Replaces the redactor list.
    pub fn redactors<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.redactors = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Sets a provider parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.parameters.insert(name.into(), value.into());
        self
    }

    /// Replaces all provider parameters.
    pub fn parameters(mut self, parameters: Parameters) -> Self {
        self.config.parameters = parameters;
        self
    }

    /// Sets the circuit breaker failure threshold.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.config.circuit_breaker = self.config.circuit_breaker.failure_threshold(threshold);
        self
    }

    /// Replaces the circuit breaker configuration.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.config.circuit_breaker = config;
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SafeCallError::Configuration`] for a zero timeout, a zero
    /// failure threshold, or a retry cap below the initial delay.
    pub fn build(self) -> SafeCallResult<SafeCallConfig> {
        let config = self.config;

        if config.timeout.is_zero() {
            return Err(SafeCallError::configuration("Timeout must be greater than zero"));
        }

        if config.circuit_breaker.failure_threshold == 0 {
            return Err(SafeCallError::configuration(
                "Circuit breaker threshold must be at least 1",
            ));
        }

        if config.retry.max_delay < config.retry.initial_delay {
            return Err(SafeCallError::configuration(
                "Retry max delay must not be below the initial delay",
            ));
        }

        if !config.retry.multiplier.is_finite() || config.retry.multiplier < 1.0 {
            return Err(SafeCallError::configuration(
                "Retry multiplier must be a finite value of at least 1.0",
            ));
        }

        Ok(config)
    }
}
