//! Error types for safe calls.
//!
//! Each variant of [`SafeCallError`] corresponds to one way a single
//! `generate` call can end without a result. Only [`SafeCallError::Backend`]
//! reflects backend reachability; moderation and parse outcomes never affect
//! the circuit breaker.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::schema::SchemaError;

/// Result type alias for safe call operations.
pub type SafeCallResult<T> = Result<T, SafeCallError>;

/// Which side of the call a moderation gate rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModerationSide {
    /// The sanitized prompt was rejected.
    Input,
    /// The backend's response was rejected.
    Output,
}

impl fmt::Display for ModerationSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModerationSide::Input => f.write_str("input"),
            ModerationSide::Output => f.write_str("output"),
        }
    }
}

/// Error type for a single orchestrated call.
#[derive(Debug, Error)]
pub enum SafeCallError {
    /// The circuit breaker is open; no work was attempted.
    #[error("Circuit breaker open after {failures} consecutive failures")]
    CircuitOpen {
        /// Consecutive failures recorded when the call was rejected.
        failures: u32,
    },

    /// A moderation gate rejected the prompt or the response.
    #[error("Moderation blocked {side}: {reason}")]
    ModerationBlocked {
        /// Side that was blocked.
        side: ModerationSide,
        /// Reason reported by the moderator.
        reason: String,
    },

    /// The backend kept failing until the retry budget was spent.
    #[error("Backend failed after {attempts} attempts: {source}")]
    Backend {
        /// Number of attempts made.
        attempts: u32,
        /// The last failure reported by the backend.
        #[source]
        source: BackendError,
    },

    /// Structured output could not be parsed, even after repair.
    #[error("Could not parse output as {schema}: {source}")]
    Parse {
        /// Name of the target schema.
        schema: String,
        /// The parse failure of the repaired text.
        #[source]
        source: SchemaError,
    },

    /// Invalid configuration.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message describing the configuration issue.
        message: String,
    },
}

impl SafeCallError {
    /// Returns true if the call was rejected by an open circuit.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, SafeCallError::CircuitOpen { .. })
    }

    /// Returns true if a moderation gate rejected the call.
    pub fn is_moderation_blocked(&self) -> bool {
        matches!(self, SafeCallError::ModerationBlocked { .. })
    }

    /// Returns the blocked side for moderation errors.
    pub fn moderation_side(&self) -> Option<ModerationSide> {
        match self {
            SafeCallError::ModerationBlocked { side, .. } => Some(*side),
            _ => None,
        }
    }

    /// Returns true if this error counts as a failure against the circuit breaker.
    pub fn should_record_failure(&self) -> bool {
        matches!(self, SafeCallError::Backend { .. })
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        SafeCallError::Configuration {
            message: message.into(),
        }
    }
}

/// Failure reported by a completion backend for one invocation.
///
/// Every variant is treated as transient by the retry wrapper.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Transient failure (connection reset, overloaded, ...).
    #[error("Transient backend error: {message}")]
    Transient {
        /// Error message.
        message: String,
    },

    /// The invocation did not finish within the configured timeout.
    #[error("Backend call timed out after {timeout:?}")]
    Timeout {
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// Provider-reported failure.
    #[error("Provider error{}: {message}", status_suffix(.status_code))]
    Provider {
        /// Error message.
        message: String,
        /// HTTP status code, if the provider exposes one.
        status_code: Option<u16>,
    },
}

fn status_suffix(status_code: &Option<u16>) -> String {
    status_code
        .map(|code| format!(" (HTTP {code})"))
        .unwrap_or_default()
}

impl BackendError {
    /// Creates a transient error.
    pub fn transient(message: impl Into<String>) -> Self {
        BackendError::Transient {
            message: message.into(),
        }
    }

    /// Creates a provider error.
    pub fn provider(status_code: Option<u16>, message: impl Into<String>) -> Self {
        BackendError::Provider {
            message: message.into(),
            status_code,
        }
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        true
    }
}
