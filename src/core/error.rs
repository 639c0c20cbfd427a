use thiserror::Error;

use super::types::EmissionStatus;

/// Errors raised while preparing or rendering an electronic document.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CpeError {
    /// One or more input validation rules failed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A structurally required element would be missing from the document.
    #[error("structural build error: {0}")]
    Builder(String),

    /// Monetary arithmetic inconsistency.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// XML generation or parsing error.
    #[error("XML error: {0}")]
    Xml(String),

    /// Lifecycle transition out of a terminal status.
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition {
        from: EmissionStatus,
        to: EmissionStatus,
    },
}

impl CpeError {
    /// Collapse a list of validation errors into a single `Validation` error.
    pub fn from_validation(errors: &[ValidationError]) -> Self {
        let msg = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Self::Validation(msg)
    }
}

/// A single validation error with field path and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dot-separated path to the invalid field (e.g. "lines[2].quantity").
    pub field: String,
    /// Human-readable error description.
    pub message: String,
    /// SUNAT rejection code this rule guards against, if known (e.g. "3030").
    pub rule: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(rule) = &self.rule {
            write!(f, "[{}] {}: {}", rule, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

impl ValidationError {
    /// Create a validation error without a rule code.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: None,
        }
    }

    /// Create a validation error tied to a SUNAT rejection code.
    pub fn with_rule(
        field: impl Into<String>,
        message: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: Some(rule.into()),
        }
    }
}
