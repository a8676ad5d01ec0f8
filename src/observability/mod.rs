//! Observability for safe calls.
//!
//! Provides subscriber setup for `tracing`, a metrics collector fed by the
//! orchestrator, and the timer behind [`CallReport`](crate::CallReport)
//! latency.

mod logging;
mod metrics;

pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use metrics::{DefaultMetricsCollector, MetricsCollector, SafeCallMetrics};

use std::time::{Duration, Instant};

/// Timer for the measured span of a call.
#[derive(Debug, Clone, Copy)]
pub struct CallTimer {
    start: Instant,
}

impl CallTimer {
    /// Starts a timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Returns the elapsed time.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
