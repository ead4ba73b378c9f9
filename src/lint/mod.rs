//! Recipe validation.
//!
//! Recipes are validated as raw documents, before they are converted into
//! typed [`crate::recipe::Recipe`] values, so unknown fields are caught and
//! every problem is reported rather than just the first.
//!
//! # Overview
//!
//! The lint system consists of:
//!
//! - **Rules** - Individual validation checks ([`LintRule`] trait)
//! - **Registry** - Collection of all available rules ([`RuleRegistry`])
//! - **Diagnostics** - Issue reports with a field path and suggestion ([`SchemaError`])
//!
//! # Example
//!
//! ```
//! use rigup::lint::validate;
//! use serde_json::json;
//!
//! let errors = validate("jq", &json!({
//!     "label": "jq",
//!     "install": {"apt": ["apt-get", "install", "-y", "jq"]},
//! }));
//! assert!(errors.iter().any(|e| e.message.contains("needs_sudo")));
//! ```

pub mod diagnostic;
pub mod registry;
pub mod rule;
pub mod rules;
pub mod schema;

use serde_json::Value;
use std::collections::BTreeMap;

pub use diagnostic::SchemaError;
pub use registry::RuleRegistry;
pub use rule::{LintRule, RecipeDoc, RuleId, Severity};
pub use schema::SchemaGenerator;

/// Every diagnostic for one recipe, warnings included.
pub fn lint(id: &str, recipe: &Value) -> Vec<SchemaError> {
    RuleRegistry::with_builtins().check_recipe(id, recipe)
}

/// Validation errors for one recipe.
pub fn validate(id: &str, recipe: &Value) -> Vec<SchemaError> {
    lint(id, recipe).into_iter().filter(SchemaError::is_error).collect()
}

/// Validation errors across a catalog, including cross-recipe checks.
pub fn validate_all(catalog: &BTreeMap<String, Value>) -> Vec<SchemaError> {
    RuleRegistry::with_builtins()
        .check_all(catalog)
        .into_iter()
        .filter(SchemaError::is_error)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_tool_has_no_errors() {
        let errors = validate(
            "jq",
            &json!({
                "label": "jq",
                "cli": "jq",
                "install": {"apt": ["apt-get", "install", "-y", "jq"], "brew": ["brew", "install", "jq"]},
                "needs_sudo": {"apt": true, "brew": false},
                "verify": ["jq", "--version"]
            }),
        );
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn validate_reports_every_error() {
        let errors = validate(
            "broken",
            &json!({
                "install": {"aptt": ["x"], "source": {"build_system": "scons"}},
                "prefer": ["snap"],
                "colour": "blue"
            }),
        );
        let rules: Vec<&str> = errors.iter().map(|e| e.rule_id.0.as_str()).collect();
        for expected in [
            "required-fields",
            "unknown-field",
            "install-methods",
            "needs-sudo-coverage",
            "prefer-methods",
            "source-spec",
        ] {
            assert!(rules.contains(&expected), "missing {} in {:?}", expected, rules);
        }
    }

    #[test]
    fn validate_all_adds_catalog_errors() {
        let catalog = BTreeMap::from([(
            "cargo-outdated".to_string(),
            json!({
                "label": "cargo-outdated",
                "install": {"cargo": ["cargo", "install", "cargo-outdated"]},
                "needs_sudo": {"cargo": false},
                "requires": {"binaries": ["cargo"]}
            }),
        )]);
        let errors = validate_all(&catalog);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule_id, RuleId::new("undefined-dependency"));
    }
}
