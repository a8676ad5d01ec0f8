//! Completion backend contract.
//!
//! The backend is the text-generation capability being protected. Transport,
//! authentication and model selection live behind this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::errors::BackendError;

/// Provider-specific call parameters, opaque to the orchestrator.
///
/// Ordered so that cache keys derived from it are deterministic.
pub type Parameters = BTreeMap<String, serde_json::Value>;

/// Text produced by one backend invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    /// Generated text.
    pub text: String,
    /// Model that produced the text, if the backend reports it.
    pub model: Option<String>,
}

impl Completion {
    /// Creates a completion without model information.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
        }
    }

    /// Sets the reporting model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// A text-generation backend.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Produces text for `prompt`.
    ///
    /// `timeout` is the per-invocation budget; the orchestrator also enforces
    /// it from the outside.
    async fn complete(
        &self,
        prompt: &str,
        timeout: Duration,
        parameters: &Parameters,
    ) -> Result<Completion, BackendError>;

    /// Model identifier configured on the backend, if any.
    fn model(&self) -> Option<&str> {
        None
    }
}
