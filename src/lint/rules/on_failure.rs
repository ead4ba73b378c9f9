//! Failure handler rule.
//!
//! Each `on_failure` handler carries a stderr pattern and a list of
//! remediation options. An option's `strategy` decides which fields it must
//! and may carry; anything else is rejected so a misspelled field cannot
//! silently disable a remediation.

use serde_json::{Map, Value};
use std::collections::HashSet;

use super::fields::check_family_packages;
use super::RISK_LEVELS;
use crate::lint::rule::{is_command_list, RecipeDoc};
use crate::lint::{LintRule, RuleId, SchemaError};
use crate::recipe::{Condition, FailureCategory};

const HANDLER_FIELDS: &[&str] = &["pattern", "category", "label", "description", "exit_code", "options"];

/// Fields every option may carry regardless of strategy.
const OPTION_COMMON_FIELDS: &[&str] = &["id", "label", "description", "risk", "recommended", "requires", "strategy"];

/// Strategy → required fields.
const STRATEGIES: &[(&str, &[&str])] = &[
    ("install_dep", &["dep"]),
    ("install_dep_then_switch", &["dep", "switch_to"]),
    ("install_packages", &["packages"]),
    ("switch_method", &["method"]),
    ("retry_with_modifier", &["modifier"]),
    ("add_repo", &["repo_commands"]),
    ("upgrade_dep", &["dep"]),
    ("env_fix", &["fix_commands"]),
    ("manual", &["instructions"]),
    ("cleanup_retry", &["cleanup_commands"]),
];

fn strategy_fields(name: &str) -> Option<&'static [&'static str]> {
    STRATEGIES.iter().find(|(s, _)| *s == name).map(|(_, f)| *f)
}

/// Validates `on_failure` handlers and their remediation options.
pub struct OnFailureRule;

impl LintRule for OnFailureRule {
    fn id(&self) -> RuleId {
        RuleId::new("on-failure")
    }

    fn name(&self) -> &str {
        "Failure Handlers"
    }

    fn description(&self) -> &str {
        "Validates on_failure patterns, categories, and remediation strategies"
    }

    fn check(&self, doc: &RecipeDoc<'_>) -> Vec<SchemaError> {
        let Some(handlers) = doc.get("on_failure") else {
            return Vec::new();
        };
        let Some(handlers) = handlers.as_array() else {
            return vec![self.error(doc.id, "on_failure must be a list of handlers").at("on_failure")];
        };

        let mut diagnostics = Vec::new();
        for (i, handler) in handlers.iter().enumerate() {
            let path = format!("on_failure[{}]", i);
            match handler.as_object() {
                Some(obj) => self.check_handler(doc.id, &path, obj, &mut diagnostics),
                None => diagnostics.push(self.error(doc.id, "Handler must be a mapping").at(path)),
            }
        }
        diagnostics
    }
}

impl OnFailureRule {
    fn check_handler(
        &self,
        recipe: &str,
        path: &str,
        handler: &Map<String, Value>,
        diagnostics: &mut Vec<SchemaError>,
    ) {
        for key in handler.keys() {
            if !HANDLER_FIELDS.contains(&key.as_str()) {
                diagnostics.push(self.error(recipe, format!("Unknown handler field '{}'", key)).at(path));
            }
        }

        match handler.get("pattern").and_then(Value::as_str) {
            Some(pattern) => {
                if let Err(e) = regex::Regex::new(pattern) {
                    diagnostics.push(
                        self.error(recipe, format!("Pattern does not compile: {}", e))
                            .at(format!("{}.pattern", path)),
                    );
                }
            }
            None => diagnostics.push(self.error(recipe, "Handler is missing a pattern").at(path)),
        }

        let category = handler.get("category").and_then(Value::as_str);
        if !category.is_some_and(|c| FailureCategory::NAMES.contains(&c)) {
            diagnostics.push(
                self.error(
                    recipe,
                    format!(
                        "category must be one of {}",
                        FailureCategory::NAMES.join(", ")
                    ),
                )
                .at(format!("{}.category", path)),
            );
        }

        if !handler.get("label").is_some_and(Value::is_string) {
            diagnostics.push(self.error(recipe, "Handler is missing a label").at(path));
        }

        let Some(options) = handler.get("options").and_then(Value::as_array) else {
            diagnostics.push(self.error(recipe, "Handler must declare options").at(path));
            return;
        };

        let mut seen = HashSet::new();
        for (j, option) in options.iter().enumerate() {
            let at = format!("{}.options[{}]", path, j);
            let Some(opt) = option.as_object() else {
                diagnostics.push(self.error(recipe, "Option must be a mapping").at(at));
                continue;
            };
            if let Some(id) = opt.get("id").and_then(Value::as_str) {
                if !seen.insert(id) {
                    diagnostics.push(
                        self.error(recipe, format!("Duplicate option id '{}'", id))
                            .at(at.clone()),
                    );
                }
            }
            self.check_option(recipe, &at, opt, diagnostics);
        }
    }

    fn check_option(
        &self,
        recipe: &str,
        path: &str,
        opt: &Map<String, Value>,
        diagnostics: &mut Vec<SchemaError>,
    ) {
        for field in ["id", "label"] {
            if !opt.get(field).is_some_and(Value::is_string) {
                diagnostics.push(
                    self.error(recipe, format!("Option is missing required field '{}'", field))
                        .at(path),
                );
            }
        }

        if let Some(risk) = opt.get("risk") {
            if !risk.as_str().is_some_and(|r| RISK_LEVELS.contains(&r)) {
                diagnostics.push(self.error(recipe, "Option risk is not a known level").at(path));
            }
        }

        if let Some(requires) = opt.get("requires") {
            match requires.as_array() {
                Some(conds) => {
                    for cond in conds {
                        if !cond.as_str().is_some_and(|c| Condition::NAMES.contains(&c)) {
                            diagnostics.push(
                                self.error(recipe, format!("Unknown condition {}", cond))
                                    .at(format!("{}.requires", path))
                                    .with_suggestion(format!("Use one of: {}", Condition::NAMES.join(", "))),
                            );
                        }
                    }
                }
                None => diagnostics.push(
                    self.error(recipe, "requires must be a list of conditions")
                        .at(format!("{}.requires", path)),
                ),
            }
        }

        let Some(strategy) = opt.get("strategy").and_then(Value::as_str) else {
            diagnostics.push(self.error(recipe, "Option is missing a strategy").at(path));
            return;
        };
        let Some(required) = strategy_fields(strategy) else {
            diagnostics.push(
                self.error(recipe, format!("Unknown strategy '{}'", strategy))
                    .at(format!("{}.strategy", path)),
            );
            return;
        };

        for field in required {
            if !opt.contains_key(*field) {
                diagnostics.push(
                    self.error(
                        recipe,
                        format!("Strategy '{}' requires field '{}'", strategy, field),
                    )
                    .at(path),
                );
            }
        }
        for key in opt.keys() {
            if !OPTION_COMMON_FIELDS.contains(&key.as_str()) && !required.contains(&key.as_str()) {
                diagnostics.push(
                    self.error(
                        recipe,
                        format!("Field '{}' is not valid for strategy '{}'", key, strategy),
                    )
                    .at(path),
                );
            }
        }

        for (field, value) in opt {
            let typed = match field.as_str() {
                "dep" | "switch_to" | "method" | "instructions" => value.is_string(),
                "modifier" => value.is_object(),
                "repo_commands" | "fix_commands" | "cleanup_commands" => is_command_list(value),
                "packages" => {
                    diagnostics.extend(check_family_packages(
                        self,
                        recipe,
                        &format!("{}.packages", path),
                        value,
                    ));
                    true
                }
                _ => true,
            };
            if !typed {
                diagnostics.push(
                    self.error(recipe, format!("Field '{}' has the wrong type", field))
                        .at(path),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(handlers: Value) -> Vec<SchemaError> {
        let value = json!({"label": "t", "install": {}, "on_failure": handlers});
        let obj = value.as_object().unwrap().clone();
        OnFailureRule.check(&RecipeDoc::new("t", &obj))
    }

    #[test]
    fn valid_handler_passes() {
        let diags = run(json!([{
            "pattern": "error: linker `cc` not found",
            "category": "compiler",
            "label": "C linker missing",
            "options": [
                {"id": "gcc", "label": "Install build tools", "strategy": "install_packages",
                 "packages": {"debian": ["build-essential"], "rhel": ["gcc"]}, "recommended": true},
                {"id": "manual", "label": "Install manually", "strategy": "manual",
                 "instructions": "Install a C compiler", "requires": ["is_linux"]}
            ]
        }]));
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn bad_regex_and_category() {
        let diags = run(json!([{
            "pattern": "unclosed (group",
            "category": "weather",
            "label": "x",
            "options": []
        }]));
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn strategy_field_sets_are_enforced() {
        let diags = run(json!([{
            "pattern": "x",
            "category": "dependency",
            "label": "x",
            "options": [
                {"id": "a", "label": "A", "strategy": "install_dep_then_switch", "dep": "rustup"},
                {"id": "b", "label": "B", "strategy": "switch_method", "method": "apt", "dep": "x"},
                {"id": "c", "label": "C", "strategy": "teleport"}
            ]
        }]));
        // missing switch_to, extra dep, unknown strategy
        assert_eq!(diags.len(), 3);
    }

    #[test]
    fn duplicate_option_ids_and_bad_conditions() {
        let diags = run(json!([{
            "pattern": "x",
            "category": "permissions",
            "label": "x",
            "options": [
                {"id": "a", "label": "A", "strategy": "manual", "instructions": "x"},
                {"id": "a", "label": "A", "strategy": "manual", "instructions": "y", "requires": ["is_windows"]}
            ]
        }]));
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn packages_must_use_known_families() {
        let diags = run(json!([{
            "pattern": "x",
            "category": "dependency",
            "label": "x",
            "options": [
                {"id": "a", "label": "A", "strategy": "install_packages", "packages": {"windows": ["x"]}}
            ]
        }]));
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn command_fields_must_be_argv_lists() {
        let diags = run(json!([{
            "pattern": "x",
            "category": "disk",
            "label": "x",
            "options": [
                {"id": "a", "label": "A", "strategy": "cleanup_retry", "cleanup_commands": ["rm -rf /tmp/x"]}
            ]
        }]));
        assert_eq!(diags.len(), 1);
    }
}
