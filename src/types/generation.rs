//! Result envelope.

use serde::{Deserialize, Serialize};
use std::ops::Deref;

use super::CallReport;

/// A call's result together with its report.
///
/// The report travels beside the value instead of inside it, so structured
/// results keep exactly their schema's shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation<T> {
    value: T,
    report: CallReport,
}

impl<T> Generation<T> {
    /// Pairs a value with its report.
    pub fn new(value: T, report: CallReport) -> Self {
        Self { value, report }
    }

    /// Returns the result value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Returns the call report.
    pub fn report(&self) -> &CallReport {
        &self.report
    }

    /// Discards the report.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Splits into value and report.
    pub fn into_parts(self) -> (T, CallReport) {
        (self.value, self.report)
    }
}

impl<T> Deref for Generation<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_generation_accessors() {
        let report = CallReport::new(Duration::from_millis(5), Some("m".to_string()));
        let generation = Generation::new("hello".to_string(), report.clone());

        assert_eq!(generation.len(), 5);
        assert_eq!(generation.value(), "hello");
        assert_eq!(generation.report(), &report);

        let (value, parts_report) = generation.into_parts();
        assert_eq!(value, "hello");
        assert_eq!(parts_report, report);
    }
}
