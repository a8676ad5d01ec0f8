//! Resilience layer for safe calls.
//!
//! Provides the bounded retry policy wrapped around every backend invocation
//! and the consecutive-failure circuit breaker owned by each
//! [`SafeCall`](crate::SafeCall).

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::{RetryConfig, RetryPolicy};
