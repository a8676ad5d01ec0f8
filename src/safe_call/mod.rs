//! The `SafeCall` orchestrator.
//!
//! [`SafeCall::generate`] runs one prompt through a fixed pipeline:
//!
//! 1. reject immediately while the circuit is open
//! 2. redact the prompt
//! 3. moderate the sanitized prompt
//! 4. return a cached result if one exists
//! 5. call the backend with retries, recording the outcome on the breaker
//! 6. moderate the response
//! 7. parse it, with at most one repair call for structured output
//! 8. build the [`CallReport`]
//! 9. cache the result

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::backend::{Completion, CompletionBackend};
use crate::cache::{CacheKey, InMemoryCache, ResponseCache};
use crate::config::{SafeCallConfig, SafeCallConfigBuilder};
use crate::errors::{BackendError, ModerationSide, SafeCallError, SafeCallResult};
use crate::moderation::{self, KeywordModerator, Moderator};
use crate::observability::{CallTimer, DefaultMetricsCollector, MetricsCollector};
use crate::redaction::{PatternRedactor, Redactor};
use crate::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryConfig, RetryPolicy};
use crate::schema::{repair_prompt, OutputSchema, RawText, SchemaError};
use crate::types::{CallReport, Generation};

type SharedCache<T> = Arc<dyn ResponseCache<Generation<T>>>;

/// A resilient wrapper around one completion backend.
///
/// # Example
///
/// ```rust,no_run
/// use llm_safecall::{JsonSchema, SafeCall};
/// # use std::sync::Arc;
/// # use llm_safecall::CompletionBackend;
///
/// #[derive(Clone, serde::Deserialize)]
/// struct Answer {
///     text: String,
/// }
///
/// # async fn run(backend: Arc<dyn CompletionBackend>) -> Result<(), llm_safecall::SafeCallError> {
/// let call = SafeCall::builder(backend)
///     .output(JsonSchema::<Answer>::new())
///     .redact("email")
///     .build()?;
///
/// let answer = call.generate("Say hi to bob@example.com").await?;
/// println!("{} ({} ms)", answer.text, answer.report().latency_ms);
/// # Ok(())
/// # }
/// ```
pub struct SafeCall<S: OutputSchema = RawText> {
    backend: Arc<dyn CompletionBackend>,
    schema: S,
    config: SafeCallConfig,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    moderator: Arc<dyn Moderator>,
    redactor: Arc<dyn Redactor>,
    cache: Option<SharedCache<S::Output>>,
    metrics: Arc<dyn MetricsCollector>,
}

impl SafeCall<RawText> {
    /// Creates a builder for raw-text calls.
    ///
    /// Switch to structured output with [`SafeCallBuilder::output`].
    pub fn builder(backend: Arc<dyn CompletionBackend>) -> SafeCallBuilder<RawText> {
        SafeCallBuilder::new(backend)
    }
}

impl<S: OutputSchema> SafeCall<S> {
    /// Runs `prompt` through the pipeline.
    ///
    /// # Errors
    ///
    /// - [`SafeCallError::CircuitOpen`] if the circuit is open; nothing else ran.
    /// - [`SafeCallError::ModerationBlocked`] if either gate rejects.
    /// - [`SafeCallError::Backend`] once the retry budget is spent.
    /// - [`SafeCallError::Parse`] if structured output fails to parse after repair.
    #[instrument(
        skip(self, prompt),
        fields(
            schema = %self.schema.name(),
            moderation = self.config.moderation,
            cache_enabled = self.cache.is_some(),
        )
    )]
    pub async fn generate(&self, prompt: &str) -> SafeCallResult<Generation<S::Output>> {
        if self.breaker.is_open() {
            let failures = self.breaker.failure_count();
            self.metrics.record_circuit_rejection();
            warn!(failures, "Circuit open, rejecting call");
            return Err(SafeCallError::CircuitOpen { failures });
        }

        let prompt = self.redactor.redact(prompt, &self.config.redactors);

        if self.config.moderation {
            self.moderate(ModerationSide::Input, &prompt)?;
        }

        let key = match &self.cache {
            Some(cache) => {
                let key = cache.key(
                    &prompt,
                    &self.config.parameters,
                    self.schema.identity().as_deref(),
                );
                if let Some(hit) = cache.get(&key).await {
                    self.metrics.record_cache_hit();
                    debug!(key = %key, "Cache hit");
                    return Ok(hit);
                }
                self.metrics.record_cache_miss();
                Some(key)
            }
            None => None,
        };

        let timer = CallTimer::start();
        let completion = self.call_recorded(&prompt).await?;

        if self.config.moderation {
            self.moderate(ModerationSide::Output, &completion.text)?;
        }

        let (value, completion, repaired) = self.parse_or_repair(completion).await?;

        let model = completion
            .model
            .or_else(|| self.backend.model().map(String::from));
        if let Some(model) = &model {
            self.metrics.record_model_usage(model);
        }

        let report = CallReport::new(timer.elapsed(), model).repaired(repaired);
        let generation = Generation::new(value, report);

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            self.store(cache, key, &generation).await;
        }

        Ok(generation)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SafeCallConfig {
        &self.config
    }

    /// Returns the output schema.
    pub fn schema(&self) -> &S {
        &self.schema
    }

    /// Returns the circuit breaker.
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Returns the metrics collector.
    pub fn metrics(&self) -> &dyn MetricsCollector {
        self.metrics.as_ref()
    }

    /// Closes the circuit and clears its failure count.
    ///
    /// This is the only way out of the open state other than a successful
    /// call, which an open circuit never lets through.
    pub fn reset_circuit(&self) {
        info!(
            failures = self.breaker.failure_count(),
            "Circuit reset by operator"
        );
        self.breaker.reset();
    }

    fn moderate(&self, side: ModerationSide, text: &str) -> SafeCallResult<()> {
        moderation::gate(self.moderator.as_ref(), side, text).map_err(|err| {
            self.metrics.record_moderation_block(side);
            warn!(side = %side, error = %err, "Moderation blocked call");
            err
        })
    }

    /// The primary call: its outcome is recorded on the breaker exactly once.
    async fn call_recorded(&self, prompt: &str) -> SafeCallResult<Completion> {
        match self.invoke(prompt).await {
            Ok(completion) => {
                self.breaker.record_success();
                Ok(completion)
            }
            Err(err) => {
                if err.should_record_failure() {
                    self.breaker.record_failure();
                }
                Err(err)
            }
        }
    }

    /// One retried backend call, each attempt bounded by the timeout.
    async fn invoke(&self, prompt: &str) -> SafeCallResult<Completion> {
        let timer = CallTimer::start();
        let timeout = self.config.timeout;
        let backend = self.backend.as_ref();
        let parameters = &self.config.parameters;

        let result = self
            .retry
            .execute(move || async move {
                match tokio::time::timeout(timeout, backend.complete(prompt, timeout, parameters))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(BackendError::Timeout { timeout }),
                }
            })
            .await;

        self.metrics.record_call(result.is_ok(), timer.elapsed());
        result
    }

    /// Parses the completion, issuing a single repair call on failure.
    async fn parse_or_repair(
        &self,
        completion: Completion,
    ) -> SafeCallResult<(S::Output, Completion, bool)> {
        let first_error = match self.schema.parse(&completion.text) {
            Ok(value) => return Ok((value, completion, false)),
            Err(err) if !self.schema.is_structured() => return Err(self.parse_error(err)),
            Err(err) => err,
        };

        info!(error = %first_error, "Output did not parse, issuing repair call");

        let prompt = repair_prompt(self.schema.name(), &completion.text);
        let repaired = match self.invoke(&prompt).await {
            Ok(repaired) => repaired,
            Err(err) => {
                self.metrics.record_repair(false);
                return Err(err);
            }
        };

        match self.schema.parse(&repaired.text) {
            Ok(value) => {
                self.metrics.record_repair(true);
                Ok((value, repaired, true))
            }
            Err(err) => {
                self.metrics.record_repair(false);
                warn!(error = %err, "Repaired output did not parse");
                Err(self.parse_error(err))
            }
        }
    }

    fn parse_error(&self, source: SchemaError) -> SafeCallError {
        SafeCallError::Parse {
            schema: self.schema.name().to_string(),
            source,
        }
    }

    async fn store(
        &self,
        cache: &SharedCache<S::Output>,
        key: CacheKey,
        generation: &Generation<S::Output>,
    ) {
        debug!(key = %key, "Caching result");
        cache.set(key, generation.clone()).await;
    }
}

impl<S: OutputSchema + fmt::Debug> fmt::Debug for SafeCall<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeCall")
            .field("schema", &self.schema)
            .field("config", &self.config)
            .field("circuit_breaker", &self.breaker)
            .field("cache_enabled", &self.cache.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`SafeCall`].
pub struct SafeCallBuilder<S: OutputSchema = RawText> {
    backend: Arc<dyn CompletionBackend>,
    schema: S,
    config: SafeCallConfigBuilder,
    moderator: Option<Arc<dyn Moderator>>,
    redactor: Option<Arc<dyn Redactor>>,
    cache_enabled: bool,
    cache: Option<SharedCache<S::Output>>,
    metrics: Option<Arc<dyn MetricsCollector>>,
}

impl SafeCallBuilder<RawText> {
    /// Creates a builder with default settings and raw-text output.
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            schema: RawText,
            config: SafeCallConfigBuilder::new(),
            moderator: None,
            redactor: None,
            cache_enabled: true,
            cache: None,
            metrics: None,
        }
    }
}

impl<S: OutputSchema> SafeCallBuilder<S> {
    /// Sets the output schema.
    ///
    /// A custom cache is typed by the output, so one set earlier is dropped;
    /// call [`cache`](Self::cache) after this.
    pub fn output<T: OutputSchema>(self, schema: T) -> SafeCallBuilder<T> {
        if self.cache.is_some() {
            debug!("Output schema changed, dropping custom cache");
        }

        SafeCallBuilder {
            backend: self.backend,
            schema,
            config: self.config,
            moderator: self.moderator,
            redactor: self.redactor,
            cache_enabled: self.cache_enabled,
            cache: None,
            metrics: self.metrics,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: SafeCallConfig) -> Self {
        self.config = SafeCallConfigBuilder::from(config);
        self
    }

    /// Sets the per-invocation timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.timeout(timeout);
        self
    }

    /// Sets the number of retries after the first attempt.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config = self.config.max_retries(max_retries);
        self
    }

    /// Replaces the retry configuration.
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config = self.config.retry(retry);
        self
    }

    /// Enables or disables moderation.
    pub fn moderation(mut self, enabled: bool) -> Self {
        self.config = self.config.moderation(enabled);
        self
    }

    /// Appends a redactor identifier.
    pub fn redact(mut self, id: impl Into<String>) -> Self {
        self.config = self.config.redact(id);
        self
    }

    /// Sets a provider parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config = self.config.param(name, value);
        self
    }

    /// Sets the moderator. Defaults to [`KeywordModerator`].
    pub fn moderator(mut self, moderator: Arc<dyn Moderator>) -> Self {
        self.moderator = Some(moderator);
        self
    }

    /// Sets the redactor. Defaults to [`PatternRedactor`].
    pub fn redactor(mut self, redactor: Arc<dyn Redactor>) -> Self {
        self.redactor = Some(redactor);
        self
    }

    /// Sets the cache. Defaults to an [`InMemoryCache`].
    pub fn cache(mut self, cache: SharedCache<S::Output>) -> Self {
        self.cache_enabled = true;
        self.cache = Some(cache);
        self
    }

    /// Disables caching.
    pub fn no_cache(mut self) -> Self {
        self.cache_enabled = false;
        self.cache = None;
        self
    }

    /// Sets the circuit breaker configuration.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.config = self.config.circuit_breaker(config);
        self
    }

    /// Sets the metrics collector. Defaults to [`DefaultMetricsCollector`].
    pub fn metrics(mut self, metrics: Arc<dyn MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the `SafeCall`.
    ///
    /// # Errors
    ///
    /// Returns [`SafeCallError::Configuration`] if the configuration is
    /// invalid.
    pub fn build(self) -> SafeCallResult<SafeCall<S>> {
        let config = self.config.build()?;

        let cache = if self.cache_enabled {
            Some(self.cache.unwrap_or_else(|| {
                Arc::new(InMemoryCache::<Generation<S::Output>>::new()) as SharedCache<S::Output>
            }))
        } else {
            None
        };

        Ok(SafeCall {
            backend: self.backend,
            schema: self.schema,
            retry: RetryPolicy::new(config.retry.clone()),
            breaker: CircuitBreaker::new(config.circuit_breaker.clone()),
            moderator: self
                .moderator
                .unwrap_or_else(|| Arc::new(KeywordModerator::default())),
            redactor: self
                .redactor
                .unwrap_or_else(|| Arc::new(PatternRedactor::new())),
            cache,
            metrics: self
                .metrics
                .unwrap_or_else(|| Arc::new(DefaultMetricsCollector::new())),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{CountingCache, CountingRedactor, MockBackend, MockModerator};
    use crate::resilience::CircuitState;
    use crate::schema::JsonSchema;
    use pretty_assertions::assert_eq;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Person {
        name: String,
        age: u32,
    }

    fn fast_retry() -> RetryConfig {
        RetryConfig::default()
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(2))
            .jitter(Duration::ZERO)
    }

    fn builder(backend: &Arc<MockBackend>) -> SafeCallBuilder<RawText> {
        SafeCall::builder(backend.clone()).retry_config(fast_retry())
    }

    #[tokio::test]
    async fn test_raw_text_success() {
        let backend = Arc::new(MockBackend::new("hello").with_model("mock-1"));
        let call = builder(&backend).build().unwrap();

        let result = call.generate("hi").await.unwrap();

        assert_eq!(result.value(), "hello");
        assert_eq!(result.report().model.as_deref(), Some("mock-1"));
        assert!(!result.report().repaired);
        assert_eq!(backend.call_count(), 1);
        assert_eq!(call.circuit_breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_completion_model_wins_over_backend_model() {
        let backend = Arc::new(MockBackend::new("unused").with_model("fallback"));
        backend.queue_completion(Completion::new("x").with_model("served-by"));
        let call = builder(&backend).build().unwrap();

        let result = call.generate("hi").await.unwrap();

        assert_eq!(result.report().model.as_deref(), Some("served-by"));
    }

    #[tokio::test]
    async fn test_open_circuit_short_circuits_everything() {
        let backend = Arc::new(MockBackend::new("ok"));
        let moderator = Arc::new(MockModerator::new());
        let redactor = Arc::new(CountingRedactor::new());
        let cache = Arc::new(CountingCache::<Generation<String>>::new());
        let call = builder(&backend)
            .moderator(moderator.clone())
            .redactor(redactor.clone())
            .cache(cache.clone())
            .circuit_breaker(CircuitBreakerConfig::new().failure_threshold(1))
            .build()
            .unwrap();

        call.circuit_breaker().record_failure();
        let err = call.generate("hi").await.unwrap_err();

        assert!(matches!(err, SafeCallError::CircuitOpen { failures: 1 }));
        assert_eq!(redactor.call_count(), 0);
        assert_eq!(moderator.input_checks(), 0);
        assert_eq!(cache.get_count(), 0);
        assert_eq!(backend.call_count(), 0);
        assert_eq!(call.metrics().get_metrics().circuit_rejections, 1);
    }

    #[tokio::test]
    async fn test_input_block_skips_cache_and_backend() {
        let backend = Arc::new(MockBackend::new("ok"));
        let cache = Arc::new(CountingCache::<Generation<String>>::new());
        let call = builder(&backend)
            .moderator(Arc::new(MockModerator::new().blocking_input()))
            .cache(cache.clone())
            .build()
            .unwrap();

        let err = call.generate("hi").await.unwrap_err();

        assert_eq!(err.moderation_side(), Some(ModerationSide::Input));
        assert_eq!(cache.get_count(), 0);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_output_block_does_not_cache_or_trip_breaker() {
        let backend = Arc::new(MockBackend::new("ok"));
        let cache = Arc::new(CountingCache::<Generation<String>>::new());
        let call = builder(&backend)
            .moderator(Arc::new(MockModerator::new().blocking_output()))
            .cache(cache.clone())
            .build()
            .unwrap();

        let err = call.generate("hi").await.unwrap_err();

        assert_eq!(err.moderation_side(), Some(ModerationSide::Output));
        assert_eq!(backend.call_count(), 1);
        assert_eq!(cache.set_count(), 0);
        assert_eq!(call.circuit_breaker().failure_count(), 0);
    }

    #[tokio::test]
    async fn test_moderation_disabled_skips_gates() {
        let backend = Arc::new(MockBackend::new("ok"));
        let moderator = Arc::new(MockModerator::new().blocking_input().blocking_output());
        let call = builder(&backend)
            .moderator(moderator.clone())
            .moderation(false)
            .build()
            .unwrap();

        assert!(call.generate("hi").await.is_ok());
        assert_eq!(moderator.input_checks(), 0);
        assert_eq!(moderator.output_checks(), 0);
    }

    #[tokio::test]
    async fn test_prompt_is_redacted_before_backend() {
        let backend = Arc::new(MockBackend::new("ok"));
        let call = builder(&backend).redact("email").build().unwrap();

        call.generate("mail jane@example.com now").await.unwrap();

        assert_eq!(
            backend.last_prompt().as_deref(),
            Some("mail [REDACTED_EMAIL] now")
        );
    }

    #[tokio::test]
    async fn test_cache_hit_returns_stored_generation() {
        let backend = Arc::new(MockBackend::new("ok"));
        let cache = Arc::new(CountingCache::<Generation<String>>::new());
        let call = builder(&backend).cache(cache.clone()).build().unwrap();

        let first = call.generate("hi").await.unwrap();
        let second = call.generate("hi").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.call_count(), 1);
        assert_eq!(cache.hit_count(), 1);
        assert_eq!(cache.set_count(), 1);

        let metrics = call.metrics().get_metrics();
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 1);
    }

    #[tokio::test]
    async fn test_no_cache_calls_backend_every_time() {
        let backend = Arc::new(MockBackend::new("ok"));
        let call = builder(&backend).no_cache().build().unwrap();

        call.generate("hi").await.unwrap();
        call.generate("hi").await.unwrap();

        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_retries_are_one_breaker_outcome() {
        let backend = Arc::new(MockBackend::failing(BackendError::transient("down")));
        let call = builder(&backend).build().unwrap();

        let err = call.generate("hi").await.unwrap_err();

        assert!(matches!(err, SafeCallError::Backend { attempts: 3, .. }));
        assert_eq!(backend.call_count(), 3);
        assert_eq!(call.circuit_breaker().failure_count(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_then_success_resets_breaker() {
        let backend = Arc::new(MockBackend::new("ok"));
        let call = builder(&backend).build().unwrap();

        call.circuit_breaker().record_failure();
        backend.queue_error(BackendError::transient("blip"));

        assert!(call.generate("hi").await.is_ok());
        assert_eq!(backend.call_count(), 2);
        assert_eq!(call.circuit_breaker().failure_count(), 0);
    }

    #[tokio::test]
    async fn test_attempt_timeout_is_retried() {
        let backend = Arc::new(MockBackend::new("slow").with_delay(Duration::from_millis(200)));
        let call = builder(&backend)
            .timeout(Duration::from_millis(10))
            .max_retries(1)
            .build()
            .unwrap();

        let err = call.generate("hi").await.unwrap_err();

        match err {
            SafeCallError::Backend { attempts, source } => {
                assert_eq!(attempts, 2);
                assert_eq!(
                    source,
                    BackendError::Timeout {
                        timeout: Duration::from_millis(10)
                    }
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_structured_parse() {
        let backend = Arc::new(MockBackend::new(r#"{"name": "Ada", "age": 36}"#));
        let call = builder(&backend)
            .output(JsonSchema::<Person>::new())
            .build()
            .unwrap();

        let person = call.generate("who").await.unwrap();

        assert_eq!(
            person.value(),
            &Person {
                name: "Ada".to_string(),
                age: 36
            }
        );
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_repair_once_then_succeed() {
        let backend = Arc::new(MockBackend::new(r#"{"name": "Ada", "age": 36}"#));
        backend.queue_text("name: Ada, age: 36");
        let call = builder(&backend)
            .output(JsonSchema::<Person>::new())
            .build()
            .unwrap();

        let person = call.generate("who").await.unwrap();

        assert_eq!(person.name, "Ada");
        assert!(person.report().repaired);
        assert_eq!(backend.call_count(), 2);

        let prompts = backend.prompts();
        assert!(prompts[1].starts_with("Repair this to valid Person JSON only."));
        assert!(prompts[1].ends_with("name: Ada, age: 36"));

        let metrics = call.metrics().get_metrics();
        assert_eq!(metrics.repairs_attempted, 1);
        assert_eq!(metrics.repairs_succeeded, 1);
    }

    #[tokio::test]
    async fn test_repair_failure_is_parse_error_after_two_calls() {
        let backend = Arc::new(MockBackend::new("still not json"));
        let call = builder(&backend)
            .output(JsonSchema::<Person>::new())
            .build()
            .unwrap();

        let err = call.generate("who").await.unwrap_err();

        assert!(matches!(err, SafeCallError::Parse { ref schema, .. } if schema == "Person"));
        assert_eq!(backend.call_count(), 2);
        assert_eq!(call.circuit_breaker().failure_count(), 0);
        assert_eq!(call.circuit_breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_reset_circuit() {
        let backend = Arc::new(MockBackend::new("ok"));
        let call = builder(&backend)
            .circuit_breaker(CircuitBreakerConfig::new().failure_threshold(1))
            .build()
            .unwrap();

        call.circuit_breaker().record_failure();
        assert!(call.generate("hi").await.unwrap_err().is_circuit_open());

        call.reset_circuit();
        assert!(call.generate("hi").await.is_ok());
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let backend = Arc::new(MockBackend::new("ok"));
        let result = SafeCall::builder(backend)
            .timeout(Duration::ZERO)
            .build();

        assert!(matches!(result, Err(SafeCallError::Configuration { .. })));
    }
}
