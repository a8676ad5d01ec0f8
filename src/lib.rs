//! Resilient LLM calls.
//!
//! `llm-safecall` wraps one text-generation backend in a pipeline that
//! makes it behave like a dependable, typed service.
//!
//! # Features
//!
//! - **Redaction**: sensitive substrings are masked before anything else sees the prompt
//! - **Moderation**: input and output gates
//! - **Caching**: identical requests are served without calling the backend
//! - **Resilience**: bounded retries with jittered backoff and a circuit breaker
//! - **Structured output**: typed parsing with a single repair round-trip
//! - **Observability**: tracing spans, metrics, and a per-call report
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use llm_safecall::{BackendError, Completion, CompletionBackend, Parameters, SafeCall};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl CompletionBackend for Echo {
//!     async fn complete(
//!         &self,
//!         prompt: &str,
//!         _timeout: Duration,
//!         _parameters: &Parameters,
//!     ) -> Result<Completion, BackendError> {
//!         Ok(Completion::new(prompt).with_model("echo"))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let call = SafeCall::builder(Arc::new(Echo))
//!         .redact("email")
//!         .timeout(Duration::from_secs(5))
//!         .build()?;
//!
//!     let text = call.generate("Write to jane@example.com").await?;
//!     println!("{} in {:.1} ms", text.value(), text.report().latency_ms);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod backend;
pub mod cache;
pub mod config;
pub mod errors;
pub mod moderation;
pub mod observability;
pub mod redaction;
pub mod resilience;
pub mod safe_call;
pub mod schema;
pub mod types;

// Re-exports for convenience
pub use backend::{Completion, CompletionBackend, Parameters};
pub use cache::{CacheKey, InMemoryCache, NoopCache, ResponseCache};
pub use config::{SafeCallConfig, SafeCallConfigBuilder};
pub use errors::{BackendError, ModerationSide, SafeCallError, SafeCallResult};
pub use moderation::{KeywordModerator, ModerationViolation, Moderator, NoopModerator};
pub use observability::{DefaultMetricsCollector, LoggingConfig, MetricsCollector, SafeCallMetrics};
pub use redaction::{PatternRedactor, Redactor};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryConfig, RetryPolicy};
pub use safe_call::{SafeCall, SafeCallBuilder};
pub use schema::{repair_prompt, JsonSchema, OutputSchema, RawText, SchemaError};
pub use types::{CallReport, Generation};

/// Mock implementations for testing.
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
