//! Mock collaborators for testing.
//!
//! Each mock counts how often the orchestrator touches it, so tests can
//! assert which pipeline steps ran.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::backend::{Completion, CompletionBackend, Parameters};
use crate::cache::{CacheKey, InMemoryCache, ResponseCache};
use crate::errors::BackendError;
use crate::moderation::{ModerationViolation, Moderator};
use crate::redaction::{PatternRedactor, Redactor};

/// Scripted completion backend.
///
/// Queued responses are returned first, in order; once the queue is empty
/// every call gets the default response.
pub struct MockBackend {
    responses: Mutex<VecDeque<Result<Completion, BackendError>>>,
    default_response: Mutex<Result<Completion, BackendError>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
    model: Option<String>,
    delay: Option<Duration>,
}

impl MockBackend {
    /// Creates a backend that answers every call with `text`.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            default_response: Mutex::new(Ok(Completion::new(text))),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            model: None,
            delay: None,
        }
    }

    /// Creates a backend whose every call fails with `error`.
    pub fn failing(error: BackendError) -> Self {
        let backend = Self::new("");
        *backend.default_response.lock() = Err(error);
        backend
    }

    /// Sets the model reported by [`CompletionBackend::model`].
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sleeps this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues a successful completion.
    pub fn queue_text(&self, text: impl Into<String>) {
        self.responses.lock().push_back(Ok(Completion::new(text)));
    }

    /// Queues a completion.
    pub fn queue_completion(&self, completion: Completion) {
        self.responses.lock().push_back(Ok(completion));
    }

    /// Queues a failure.
    pub fn queue_error(&self, error: BackendError) {
        self.responses.lock().push_back(Err(error));
    }

    /// Replaces the default response.
    pub fn set_default(&self, response: Result<Completion, BackendError>) {
        *self.default_response.lock() = response;
    }

    /// Number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    /// The most recent prompt.
    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl CompletionBackend for MockBackend {
    async fn complete(
        &self,
        prompt: &str,
        _timeout: Duration,
        _parameters: &Parameters,
    ) -> Result<Completion, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let queued = self.responses.lock().pop_front();
        match queued {
            Some(response) => response,
            None => self.default_response.lock().clone(),
        }
    }

    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

/// Moderator that blocks on demand and counts checks.
#[derive(Default)]
pub struct MockModerator {
    block_input: bool,
    block_output: bool,
    input_checks: AtomicUsize,
    output_checks: AtomicUsize,
}

impl MockModerator {
    /// Creates a moderator that allows everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks every prompt.
    pub fn blocking_input(mut self) -> Self {
        self.block_input = true;
        self
    }

    /// Blocks every response.
    pub fn blocking_output(mut self) -> Self {
        self.block_output = true;
        self
    }

    /// Number of input checks.
    pub fn input_checks(&self) -> usize {
        self.input_checks.load(Ordering::SeqCst)
    }

    /// Number of output checks.
    pub fn output_checks(&self) -> usize {
        self.output_checks.load(Ordering::SeqCst)
    }
}

impl Moderator for MockModerator {
    fn check_input(&self, _text: &str) -> Result<(), ModerationViolation> {
        self.input_checks.fetch_add(1, Ordering::SeqCst);
        if self.block_input {
            return Err(ModerationViolation::new("input rejected by mock"));
        }
        Ok(())
    }

    fn check_output(&self, _text: &str) -> Result<(), ModerationViolation> {
        self.output_checks.fetch_add(1, Ordering::SeqCst);
        if self.block_output {
            return Err(ModerationViolation::new("output rejected by mock"));
        }
        Ok(())
    }
}

/// Redactor that delegates to [`PatternRedactor`] and counts calls.
#[derive(Default)]
pub struct CountingRedactor {
    inner: PatternRedactor,
    calls: AtomicUsize,
}

impl CountingRedactor {
    /// Creates a counting redactor over the built-in patterns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of redactions performed.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Redactor for CountingRedactor {
    fn redact(&self, text: &str, redactors: &[String]) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.redact(text, redactors)
    }
}

/// In-memory cache that counts lookups and writes.
pub struct CountingCache<V> {
    inner: InMemoryCache<V>,
    gets: AtomicUsize,
    hits: AtomicUsize,
    sets: AtomicUsize,
    keys: Mutex<Vec<CacheKey>>,
}

impl<V> CountingCache<V> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self {
            inner: InMemoryCache::new(),
            gets: AtomicUsize::new(0),
            hits: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            keys: Mutex::new(Vec::new()),
        }
    }

    /// Number of lookups.
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// Number of lookups that found a value.
    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Number of writes.
    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// Keys written, in order.
    pub fn written_keys(&self) -> Vec<CacheKey> {
        self.keys.lock().clone()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<V> Default for CountingCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> ResponseCache<V> for CountingCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &CacheKey) -> Option<V> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let value = self.inner.get(key).await;
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
        value
    }

    async fn set(&self, key: CacheKey, value: V) {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().push(key.clone());
        self.inner.set(key, value).await;
    }
}
