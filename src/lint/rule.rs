//! Lint rule definitions.
//!
//! This module provides the core traits and types for defining lint rules:
//!
//! - [`LintRule`] - The trait that all recipe rules implement
//! - [`RecipeDoc`] - The raw recipe document a rule inspects
//! - [`RuleId`] - Unique identifier for a lint rule
//! - [`Severity`] - Severity level for diagnostics (Hint, Warning, Error)

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::diagnostic::SchemaError;
use crate::recipe::infer_kind;

/// Unique identifier for a lint rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RuleId(pub String);

impl RuleId {
    /// Create a new rule ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Severity level for lint diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational hint, does not affect validity.
    Hint,
    /// Warning that should be addressed.
    Warning,
    /// Error that makes the recipe unusable.
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Hint => write!(f, "hint"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A raw recipe document under validation.
#[derive(Debug, Clone, Copy)]
pub struct RecipeDoc<'a> {
    /// Recipe id (catalog key).
    pub id: &'a str,
    /// Inferred kind, `None` when it cannot be determined.
    pub kind: Option<&'static str>,
    pub fields: &'a Map<String, Value>,
}

impl<'a> RecipeDoc<'a> {
    pub fn new(id: &'a str, fields: &'a Map<String, Value>) -> Self {
        Self {
            id,
            kind: infer_kind(fields),
            fields,
        }
    }

    pub fn is_tool(&self) -> bool {
        self.kind == Some("tool")
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.fields.get(key)
    }

    /// A field as an object, if present and an object.
    pub fn object(&self, key: &str) -> Option<&'a Map<String, Value>> {
        self.fields.get(key).and_then(Value::as_object)
    }

    /// A field as an array, if present and an array.
    pub fn array(&self, key: &str) -> Option<&'a Vec<Value>> {
        self.fields.get(key).and_then(Value::as_array)
    }
}

/// A lint rule that validates recipes.
///
/// Most rules inspect one recipe at a time through [`LintRule::check`];
/// rules that need to see references between recipes implement
/// [`LintRule::check_catalog`] instead.
pub trait LintRule: Send + Sync {
    /// Unique identifier for this rule.
    fn id(&self) -> RuleId;

    /// Human-readable name of the rule.
    fn name(&self) -> &str;

    /// Description of what this rule checks.
    fn description(&self) -> &str;

    /// Default severity for this rule.
    fn default_severity(&self) -> Severity {
        Severity::Error
    }

    /// Check a single recipe.
    fn check(&self, _doc: &RecipeDoc<'_>) -> Vec<SchemaError> {
        Vec::new()
    }

    /// Check the catalog as a whole.
    fn check_catalog(&self, _catalog: &BTreeMap<String, Value>) -> Vec<SchemaError> {
        Vec::new()
    }

    /// Start a diagnostic for this rule.
    fn error(&self, recipe: &str, message: impl Into<String>) -> SchemaError
    where
        Self: Sized,
    {
        SchemaError::new(self.id(), self.default_severity(), recipe, message)
    }
}

/// Whether `value` is a non-empty list of strings.
pub fn is_string_list(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|items| !items.is_empty() && items.iter().all(Value::is_string))
}

/// Whether `value` is a non-empty list of non-empty string lists.
pub fn is_command_list(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|items| !items.is_empty() && items.iter().all(is_string_list))
}
