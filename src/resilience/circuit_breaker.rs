//! Circuit breaker implementation.
//!
//! A consecutive-failure counter with two states. There is no half-open
//! probe and no reset timer: an open breaker stays open until a success is
//! recorded or it is reset explicitly.

use parking_lot::Mutex;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Circuit is closed, calls are permitted.
    Closed,
    /// Circuit is open, calls are rejected immediately.
    Open,
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening.
    pub failure_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
        }
    }
}

impl CircuitBreakerConfig {
    /// Creates a new configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure threshold.
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }
}

#[derive(Debug)]
struct BreakerState {
    failure_count: u32,
    open: bool,
}

/// Circuit breaker for protecting a backend against sustained failure.
///
/// All mutation goes through a single lock, so concurrent
/// [`record_failure`](Self::record_failure) calls never lose updates.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Creates a new circuit breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState {
                failure_count: 0,
                open: false,
            }),
        }
    }

    /// Creates a circuit breaker with default configuration.
    pub fn default_config() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    /// Returns the configured failure threshold.
    pub fn threshold(&self) -> u32 {
        self.config.failure_threshold
    }

    /// Returns the current state.
    pub fn state(&self) -> CircuitState {
        if self.state.lock().open {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    /// Returns true if calls must be rejected.
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Returns the number of consecutive failures.
    pub fn failure_count(&self) -> u32 {
        self.state.lock().failure_count
    }

    /// Records a successful call, closing the circuit.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.open {
            tracing::info!(
                failures = state.failure_count,
                "Circuit breaker closing after success"
            );
        }
        state.failure_count = 0;
        state.open = false;
    }

    /// Records a failed call, opening the circuit at the threshold.
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.failure_count = state.failure_count.saturating_add(1);
        if !state.open && state.failure_count >= self.config.failure_threshold {
            tracing::warn!(
                failures = state.failure_count,
                threshold = self.config.failure_threshold,
                "Circuit breaker opening"
            );
            state.open = true;
        }
    }

    /// Resets the circuit breaker to closed state.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.failure_count = 0;
        state.open = false;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::default_config()
    }
}
