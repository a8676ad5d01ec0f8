//! Output schemas.
//!
//! An [`OutputSchema`] turns raw backend text into the caller's result type.
//! [`RawText`] is the no-schema case and never fails, so it never triggers a
//! repair call; [`JsonSchema`] parses JSON into any `DeserializeOwned` type.

use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// Structured output could not be produced from text.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// The text is not valid for the schema's syntax or shape.
    #[error("invalid output: {message}")]
    Invalid {
        /// Parser message.
        message: String,
    },

    /// The text parsed but failed semantic validation.
    #[error("validation failed: {message}")]
    Validation {
        /// Validator message.
        message: String,
    },
}

impl SchemaError {
    /// Creates an invalid-output error.
    pub fn invalid(message: impl Into<String>) -> Self {
        SchemaError::Invalid {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        SchemaError::Validation {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SchemaError {
    fn from(err: serde_json::Error) -> Self {
        SchemaError::invalid(err.to_string())
    }
}

/// Converts backend text into a typed value.
pub trait OutputSchema: Send + Sync {
    /// Result type produced by [`parse`](Self::parse).
    type Output: Clone + Send + Sync + 'static;

    /// Human-readable schema name, used in repair prompts.
    fn name(&self) -> &str;

    /// Identity folded into cache keys; `None` for unstructured output.
    fn identity(&self) -> Option<String> {
        if self.is_structured() {
            Some(self.name().to_string())
        } else {
            None
        }
    }

    /// Whether parse failures should trigger a repair call.
    fn is_structured(&self) -> bool {
        true
    }

    /// Parses raw text.
    fn parse(&self, text: &str) -> Result<Self::Output, SchemaError>;
}

/// No schema: the raw text is the result.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawText;

impl OutputSchema for RawText {
    type Output = String;

    fn name(&self) -> &str {
        "text"
    }

    fn is_structured(&self) -> bool {
        false
    }

    fn parse(&self, text: &str) -> Result<String, SchemaError> {
        Ok(text.to_string())
    }
}

type Validator<T> = Arc<dyn Fn(&T) -> Result<(), String> + Send + Sync>;

/// JSON schema backed by a serde type.
pub struct JsonSchema<T> {
    name: String,
    validator: Option<Validator<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSchema<T> {
    /// Creates a schema named after `T`'s unqualified type name.
    pub fn new() -> Self {
        Self {
            name: short_type_name::<T>(),
            validator: None,
            _marker: PhantomData,
        }
    }

    /// Overrides the schema name.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a semantic check run after successful deserialization.
    #[must_use]
    pub fn with_validator(
        mut self,
        validator: impl Fn(&T) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }
}

impl<T> Default for JsonSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonSchema<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            validator: self.validator.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for JsonSchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSchema")
            .field("name", &self.name)
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

impl<T> OutputSchema for JsonSchema<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    fn parse(&self, text: &str) -> Result<T, SchemaError> {
        let value: T = serde_json::from_str(strip_code_fence(text))?;
        if let Some(validator) = &self.validator {
            validator(&value).map_err(SchemaError::validation)?;
        }
        Ok(value)
    }
}

/// Builds the single corrective prompt sent after a parse failure.
pub fn repair_prompt(schema_name: &str, failed_text: &str) -> String {
    format!(
        "Repair this to valid {schema_name} JSON only. \
         Respond with valid JSON only, nothing else:\n{failed_text}"
    )
}

/// Removes a surrounding Markdown code fence, if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn short_type_name<T>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
