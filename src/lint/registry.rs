//! Rule registry for managing lint rules.
//!
//! The [`RuleRegistry`] stores the lint rules in registration order so
//! diagnostics come out in a stable order.

use serde_json::Value;
use std::collections::BTreeMap;

use super::diagnostic::SchemaError;
use super::rule::{LintRule, RecipeDoc, RuleId};
use super::rules::{
    ChoicesRule, CircularDependencyRule, FieldTypesRule, InstallMethodsRule, NeedsSudoCoverageRule,
    OnFailureRule, PreferRule, RecipeTypeRule, RequiredFieldsRule, SourceSpecRule,
    UndefinedDependencyRule, UnknownFieldsRule,
};

/// Registry of all available lint rules.
pub struct RuleRegistry {
    rules: Vec<Box<dyn LintRule>>,
}

impl RuleRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create a registry with all built-in rules.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(RecipeTypeRule));
        registry.register(Box::new(RequiredFieldsRule));
        registry.register(Box::new(UnknownFieldsRule));
        registry.register(Box::new(FieldTypesRule));
        registry.register(Box::new(InstallMethodsRule));
        registry.register(Box::new(NeedsSudoCoverageRule));
        registry.register(Box::new(PreferRule));
        registry.register(Box::new(SourceSpecRule));
        registry.register(Box::new(ChoicesRule));
        registry.register(Box::new(OnFailureRule));
        registry.register(Box::new(UndefinedDependencyRule));
        registry.register(Box::new(CircularDependencyRule));
        registry
    }

    /// Register a lint rule, replacing any rule with the same id.
    pub fn register(&mut self, rule: Box<dyn LintRule>) {
        let id = rule.id();
        self.rules.retain(|r| r.id() != id);
        self.rules.push(rule);
    }

    /// Get a rule by ID.
    pub fn get(&self, id: &RuleId) -> Option<&dyn LintRule> {
        self.rules.iter().find(|r| &r.id() == id).map(|r| r.as_ref())
    }

    /// Iterate over all rules.
    pub fn iter(&self) -> impl Iterator<Item = &dyn LintRule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    /// Get the number of registered rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every per-recipe rule over one document.
    pub fn check_recipe(&self, id: &str, value: &Value) -> Vec<SchemaError> {
        let Some(fields) = value.as_object() else {
            return vec![SchemaError::new(
                RuleId::new("recipe-type"),
                super::Severity::Error,
                id,
                "Recipe must be a mapping",
            )];
        };
        let doc = RecipeDoc::new(id, fields);
        self.rules.iter().flat_map(|r| r.check(&doc)).collect()
    }

    /// Run every rule over the whole catalog.
    pub fn check_all(&self, catalog: &BTreeMap<String, Value>) -> Vec<SchemaError> {
        let mut diagnostics: Vec<SchemaError> = catalog
            .iter()
            .flat_map(|(id, value)| self.check_recipe(id, value))
            .collect();
        for rule in &self.rules {
            diagnostics.extend(rule.check_catalog(catalog));
        }
        diagnostics
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
