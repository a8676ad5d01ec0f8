//! Prompt redaction.
//!
//! Redaction runs before anything else touches the prompt, so moderation,
//! cache keys and the backend only ever see sanitized text.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

use crate::errors::{SafeCallError, SafeCallResult};

/// Text transform applied to prompts.
///
/// Must be total: redaction has no failure path.
pub trait Redactor: Send + Sync {
    /// Applies the redactors named in `redactors`, in order.
    fn redact(&self, text: &str, redactors: &[String]) -> String;
}

/// Built-in patterns, keyed by redactor identifier.
static BUILTIN_PATTERNS: Lazy<HashMap<&'static str, Regex>> = Lazy::new(|| {
    [
        ("email", r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
        (
            "phone",
            r"(?:\+?\d{1,3}[\s.-]?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}\b",
        ),
        ("ssn", r"\b\d{3}-\d{2}-\d{4}\b"),
        ("credit_card", r"\b\d(?:[ -]?\d){12,15}\b"),
        ("ip_address", r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
        (
            "api_key",
            r"\b(?:sk|gsk|pk|rk)[-_][A-Za-z0-9_-]{8,}|Bearer\s+[A-Za-z0-9._~+/-]+=*",
        ),
    ]
    .into_iter()
    .filter_map(|(id, pattern)| match Regex::new(pattern) {
        Ok(re) => Some((id, re)),
        Err(e) => {
            tracing::error!(redactor = id, error = %e, "Invalid built-in redaction pattern");
            None
        }
    })
    .collect()
});

/// Regex-based redactor with built-in identifiers.
///
/// Built-in identifiers: `email`, `phone`, `ssn`, `credit_card`,
/// `ip_address`, `api_key`. Matches are replaced by `[REDACTED_<ID>]`.
/// Unknown identifiers are skipped.
#[derive(Debug, Clone, Default)]
pub struct PatternRedactor {
    custom: HashMap<String, Regex>,
}

impl PatternRedactor {
    /// Creates a redactor with only the built-in identifiers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a custom identifier, shadowing a built-in of the same name.
    pub fn with_pattern(mut self, id: impl Into<String>, pattern: &str) -> SafeCallResult<Self> {
        let id = id.into();
        let re = Regex::new(pattern).map_err(|e| {
            SafeCallError::configuration(format!("Invalid redaction pattern for '{id}': {e}"))
        })?;
        self.custom.insert(id, re);
        Ok(self)
    }

    /// Returns true if `id` names a known redactor.
    pub fn supports(&self, id: &str) -> bool {
        self.custom.contains_key(id) || BUILTIN_PATTERNS.contains_key(id)
    }

    fn pattern(&self, id: &str) -> Option<&Regex> {
        self.custom.get(id).or_else(|| BUILTIN_PATTERNS.get(id))
    }
}

impl Redactor for PatternRedactor {
    fn redact(&self, text: &str, redactors: &[String]) -> String {
        let mut result = text.to_string();

        for id in redactors {
            let Some(re) = self.pattern(id) else {
                tracing::debug!(redactor = %id, "Unknown redactor, skipping");
                continue;
            };
            let replacement = format!("[REDACTED_{}]", id.to_uppercase());
            result = re.replace_all(&result, replacement.as_str()).into_owned();
        }

        result
    }
}
