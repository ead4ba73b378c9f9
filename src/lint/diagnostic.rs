//! Lint diagnostic messages.
//!
//! This module provides the [`SchemaError`] type for representing issues
//! found during recipe validation, located by recipe id and field path.

use serde::Serialize;
use std::fmt;

use super::rule::{RuleId, Severity};

/// A diagnostic produced by a lint rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaError {
    /// The rule that produced this diagnostic.
    pub rule_id: RuleId,
    /// Severity of this diagnostic.
    pub severity: Severity,
    /// Recipe id.
    pub recipe: String,
    /// Dotted path of the offending field, e.g. `on_failure[0].options[1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Human-readable message.
    pub message: String,
    /// Optional suggestion for fixing the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl SchemaError {
    /// Create a new diagnostic.
    pub fn new(
        rule_id: RuleId,
        severity: Severity,
        recipe: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            rule_id,
            severity,
            recipe: recipe.into(),
            path: None,
            message: message.into(),
            suggestion: None,
        }
    }

    /// Locate the diagnostic at a field path.
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Add a fix suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{}: {}: {}", self.recipe, path, self.message),
            None => write!(f, "{}: {}", self.recipe, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_creation() {
        let diag = SchemaError::new(RuleId::new("test-rule"), Severity::Error, "jq", "Test message");

        assert_eq!(diag.rule_id, RuleId::new("test-rule"));
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.message, "Test message");
        assert!(diag.suggestion.is_none());
        assert!(diag.path.is_none());
        assert!(diag.is_error());
    }

    #[test]
    fn diagnostic_builder_pattern() {
        let diag = SchemaError::new(RuleId::new("test"), Severity::Warning, "jq", "Bad method")
            .at("install.aptt")
            .with_suggestion("Did you mean 'apt'?");

        assert_eq!(diag.path.as_deref(), Some("install.aptt"));
        assert_eq!(diag.suggestion.as_deref(), Some("Did you mean 'apt'?"));
        assert!(!diag.is_error());
    }

    #[test]
    fn display_includes_recipe_and_path() {
        let diag = SchemaError::new(RuleId::new("x"), Severity::Error, "docker", "unknown field")
            .at("post_install[2].when");
        assert_eq!(
            diag.to_string(),
            "docker: post_install[2].when: unknown field"
        );
    }
}
