//! Call-counting stubs shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use llm_safecall::{
    BackendError, CacheKey, Completion, CompletionBackend, Generation, InMemoryCache,
    ModerationViolation, Moderator, Parameters, PatternRedactor, Redactor, ResponseCache,
    RetryConfig,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Retry settings that keep tests fast.
pub fn fast_retry() -> RetryConfig {
    RetryConfig::default()
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(2))
        .jitter(Duration::ZERO)
}

/// Plays back a script of responses, repeating the last one.
pub struct StubBackend {
    script: Vec<Result<String, BackendError>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    model: Option<String>,
    delay: Duration,
}

impl StubBackend {
    pub fn new(script: Vec<Result<String, BackendError>>) -> Self {
        assert!(!script.is_empty(), "script needs at least one response");
        Self {
            script,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            model: None,
            delay: Duration::from_millis(1),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok((*t).to_string())).collect())
    }

    pub fn failing() -> Self {
        Self::new(vec![Err(BackendError::transient("backend unavailable"))])
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = Some(model.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for StubBackend {
    async fn complete(
        &self,
        prompt: &str,
        _timeout: Duration,
        _parameters: &Parameters,
    ) -> Result<Completion, BackendError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        tokio::time::sleep(self.delay).await;

        let step = &self.script[n.min(self.script.len() - 1)];
        step.clone().map(Completion::new)
    }

    fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

/// Moderator that records every check.
#[derive(Default)]
pub struct StubModerator {
    pub blocked_input: Option<String>,
    pub blocked_output: Option<String>,
    pub input_checks: AtomicUsize,
    pub output_checks: AtomicUsize,
}

impl StubModerator {
    /// Blocks any prompt containing `needle`.
    pub fn blocking_input(needle: &str) -> Self {
        Self {
            blocked_input: Some(needle.to_string()),
            ..Self::default()
        }
    }

    /// Blocks any response containing `needle`.
    pub fn blocking_output(needle: &str) -> Self {
        Self {
            blocked_output: Some(needle.to_string()),
            ..Self::default()
        }
    }

    pub fn checks(&self) -> (usize, usize) {
        (
            self.input_checks.load(Ordering::SeqCst),
            self.output_checks.load(Ordering::SeqCst),
        )
    }
}

impl Moderator for StubModerator {
    fn check_input(&self, text: &str) -> Result<(), ModerationViolation> {
        self.input_checks.fetch_add(1, Ordering::SeqCst);
        match &self.blocked_input {
            Some(needle) if text.contains(needle.as_str()) => {
                Err(ModerationViolation::new(format!("prompt mentions {needle}")))
            }
            _ => Ok(()),
        }
    }

    fn check_output(&self, text: &str) -> Result<(), ModerationViolation> {
        self.output_checks.fetch_add(1, Ordering::SeqCst);
        match &self.blocked_output {
            Some(needle) if text.contains(needle.as_str()) => {
                Err(ModerationViolation::new(format!("response mentions {needle}")))
            }
            _ => Ok(()),
        }
    }
}

/// Redactor that records its inputs.
#[derive(Default)]
pub struct StubRedactor {
    inner: PatternRedactor,
    pub calls: AtomicUsize,
}

impl StubRedactor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Redactor for StubRedactor {
    fn redact(&self, text: &str, redactors: &[String]) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.redact(text, redactors)
    }
}

/// Cache that records lookups and writes.
pub struct StubCache<T> {
    inner: InMemoryCache<Generation<T>>,
    pub gets: AtomicUsize,
    pub sets: AtomicUsize,
}

impl<T> StubCache<T> {
    pub fn new() -> Self {
        Self {
            inner: InMemoryCache::new(),
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl<T> ResponseCache<Generation<T>> for StubCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &CacheKey) -> Option<Generation<T>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: CacheKey, value: Generation<T>) {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value).await;
    }
}
