//! Content moderation gates.
//!
//! A [`Moderator`] is consulted twice per call when moderation is enabled:
//! once on the sanitized prompt and once on the first raw response.

use regex::Regex;
use thiserror::Error;

pub use crate::errors::ModerationSide;
use crate::errors::{SafeCallError, SafeCallResult};

/// A moderation gate rejected some text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason}")]
pub struct ModerationViolation {
    /// Human-readable reason.
    pub reason: String,
}

impl ModerationViolation {
    /// Creates a violation.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub(crate) fn into_error(self, side: ModerationSide) -> SafeCallError {
        SafeCallError::ModerationBlocked {
            side,
            reason: self.reason,
        }
    }
}

/// Input and output content gates.
pub trait Moderator: Send + Sync {
    /// Checks a sanitized prompt.
    fn check_input(&self, text: &str) -> Result<(), ModerationViolation>;

    /// Checks raw backend output.
    fn check_output(&self, text: &str) -> Result<(), ModerationViolation>;
}

/// Runs the gate for `side` and maps a violation to [`SafeCallError`].
pub(crate) fn gate(moderator: &dyn Moderator, side: ModerationSide, text: &str) -> SafeCallResult<()> {
    let checked = match side {
        ModerationSide::Input => moderator.check_input(text),
        ModerationSide::Output => moderator.check_output(text),
    };
    checked.map_err(|violation| violation.into_error(side))
}

/// Moderator that lets everything through.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopModerator;

impl Moderator for NoopModerator {
    fn check_input(&self, _text: &str) -> Result<(), ModerationViolation> {
        Ok(())
    }

    fn check_output(&self, _text: &str) -> Result<(), ModerationViolation> {
        Ok(())
    }
}

/// Default input terms: common prompt-injection phrasings.
const DEFAULT_INPUT_TERMS: &[&str] = &[
    "ignore previous instructions",
    "ignore all previous instructions",
    "disregard your system prompt",
];

/// Default output terms: markup that should never reach a caller verbatim.
const DEFAULT_OUTPUT_TERMS: &[&str] = &["<script"];

/// Case-insensitive term-list moderator.
#[derive(Debug, Clone)]
pub struct KeywordModerator {
    input: Option<Regex>,
    output: Option<Regex>,
}

impl KeywordModerator {
    /// Creates a moderator with explicit term lists per side.
    ///
    /// Terms are matched literally, ignoring case.
    pub fn new<I, O>(input_terms: I, output_terms: O) -> SafeCallResult<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        O: IntoIterator,
        O::Item: AsRef<str>,
    {
        Ok(Self {
            input: compile(input_terms)?,
            output: compile(output_terms)?,
        })
    }

    /// Creates a moderator that blocks nothing.
    pub fn empty() -> Self {
        Self {
            input: None,
            output: None,
        }
    }

    fn find<'a>(pattern: Option<&Regex>, text: &'a str) -> Option<&'a str> {
        pattern.and_then(|re| re.find(text)).map(|m| m.as_str())
    }
}

impl Default for KeywordModerator {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_TERMS, DEFAULT_OUTPUT_TERMS).unwrap_or_else(|_| Self::empty())
    }
}

impl Moderator for KeywordModerator {
    fn check_input(&self, text: &str) -> Result<(), ModerationViolation> {
        match Self::find(self.input.as_ref(), text) {
            Some(term) => Err(ModerationViolation::new(format!(
                "blocked term '{}'",
                term.to_lowercase()
            ))),
            None => Ok(()),
        }
    }

    fn check_output(&self, text: &str) -> Result<(), ModerationViolation> {
        match Self::find(self.output.as_ref(), text) {
            Some(term) => Err(ModerationViolation::new(format!(
                "blocked term '{}'",
                term.to_lowercase()
            ))),
            None => Ok(()),
        }
    }
}

fn compile<T>(terms: T) -> SafeCallResult<Option<Regex>>
where
    T: IntoIterator,
    T::Item: AsRef<str>,
{
    let alternatives: Vec<String> = terms
        .into_iter()
        .map(|t| t.as_ref().trim().to_string())
        .filter(|t| !t.is_empty())
        .map(|t| regex::escape(&t))
        .collect();

    if alternatives.is_empty() {
        return Ok(None);
    }

    Regex::new(&format!("(?i){}", alternatives.join("|")))
        .map(Some)
        .map_err(|e| SafeCallError::configuration(format!("Invalid moderation term: {e}")))
}
