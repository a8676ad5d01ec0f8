//! Per-call report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Describes one completed orchestration.
///
/// Token and cost fields are reserved and always `None`: treat them as
/// unknown, not zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallReport {
    /// Latency of the timed span (backend call, repair call and parsing).
    pub latency_ms: f64,
    /// Model reported by the backend, if any.
    pub model: Option<String>,
    /// Prompt tokens.
    pub input_tokens: Option<u32>,
    /// Completion tokens.
    pub output_tokens: Option<u32>,
    /// Estimated cost.
    pub cost_estimate: Option<f64>,
    /// Whether a repair call produced the result.
    pub repaired: bool,
    /// When the report was built.
    pub created_at: DateTime<Utc>,
}

impl CallReport {
    /// Creates a report for a timed span.
    pub fn new(latency: Duration, model: Option<String>) -> Self {
        Self {
            latency_ms: latency.as_secs_f64() * 1000.0,
            model,
            input_tokens: None,
            output_tokens: None,
            cost_estimate: None,
            repaired: false,
            created_at: Utc::now(),
        }
    }

    /// Marks the result as produced by a repair call.
    #[must_use]
    pub fn repaired(mut self, repaired: bool) -> Self {
        self.repaired = repaired;
        self
    }

    /// Returns the latency as a `Duration`.
    pub fn latency(&self) -> Duration {
        Duration::try_from_secs_f64(self.latency_ms / 1000.0).unwrap_or_default()
    }
}
