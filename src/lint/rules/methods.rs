//! Install method rules.

use serde_json::Value;

use super::INSTALL_METHODS;
use crate::lint::rule::{is_string_list, RecipeDoc};
use crate::lint::{LintRule, RuleId, SchemaError};

/// Install keys come from the method allow-list and hold commands.
pub struct InstallMethodsRule;

impl LintRule for InstallMethodsRule {
    fn id(&self) -> RuleId {
        RuleId::new("install-methods")
    }

    fn name(&self) -> &str {
        "Install Methods"
    }

    fn description(&self) -> &str {
        "Ensures install methods are known and each holds a command"
    }

    fn check(&self, doc: &RecipeDoc<'_>) -> Vec<SchemaError> {
        if !doc.is_tool() {
            return Vec::new();
        }
        let Some(install) = doc.object("install") else {
            return match doc.get("install") {
                Some(_) => vec![self.error(doc.id, "install must be a method-keyed map").at("install")],
                None => Vec::new(),
            };
        };

        let mut diagnostics = Vec::new();
        if install.is_empty() {
            diagnostics.push(self.error(doc.id, "install declares no methods").at("install"));
        }
        for (method, spec) in install {
            let path = format!("install.{}", method);
            if !INSTALL_METHODS.contains(&method.as_str()) {
                diagnostics.push(
                    self.error(doc.id, format!("Unknown install method '{}'", method))
                        .at(path.clone())
                        .with_suggestion(format!("Use one of: {}", INSTALL_METHODS.join(", "))),
                );
            }
            // `source` is checked by the source-spec rule.
            if method != "source" && !is_string_list(spec) {
                diagnostics.push(
                    self.error(doc.id, "Install command must be a list of strings")
                        .at(path),
                );
            }
        }
        diagnostics
    }
}

/// Every install method has a `needs_sudo` entry, directly or through `_default`.
pub struct NeedsSudoCoverageRule;

impl LintRule for NeedsSudoCoverageRule {
    fn id(&self) -> RuleId {
        RuleId::new("needs-sudo-coverage")
    }

    fn name(&self) -> &str {
        "needs_sudo Coverage"
    }

    fn description(&self) -> &str {
        "Ensures every install method declares whether it needs sudo"
    }

    fn check(&self, doc: &RecipeDoc<'_>) -> Vec<SchemaError> {
        if !doc.is_tool() {
            return Vec::new();
        }
        let Some(install) = doc.object("install") else {
            return Vec::new();
        };
        let sudo = doc.object("needs_sudo");
        if doc.get("needs_sudo").is_some() && sudo.is_none() {
            return vec![self.error(doc.id, "needs_sudo must be a method-keyed map").at("needs_sudo")];
        }

        let mut diagnostics = Vec::new();
        if let Some(sudo) = sudo {
            for (method, flag) in sudo {
                if !flag.is_boolean() {
                    diagnostics.push(
                        self.error(doc.id, "needs_sudo values must be booleans")
                            .at(format!("needs_sudo.{}", method)),
                    );
                }
            }
        }
        let has_default = sudo.is_some_and(|s| s.contains_key("_default"));
        for method in install.keys() {
            let covered = has_default || sudo.is_some_and(|s| s.contains_key(method));
            if !covered {
                diagnostics.push(
                    self.error(
                        doc.id,
                        format!("Install method '{}' has no needs_sudo entry", method),
                    )
                    .at(format!("needs_sudo.{}", method))
                    .with_suggestion("Add the method to needs_sudo or declare '_default'"),
                );
            }
        }
        diagnostics
    }
}

/// `prefer` only names methods the recipe installs with.
pub struct PreferRule;

impl LintRule for PreferRule {
    fn id(&self) -> RuleId {
        RuleId::new("prefer-methods")
    }

    fn name(&self) -> &str {
        "Preferred Methods"
    }

    fn description(&self) -> &str {
        "Ensures prefer references methods declared in install"
    }

    fn check(&self, doc: &RecipeDoc<'_>) -> Vec<SchemaError> {
        let Some(prefer) = doc.get("prefer") else {
            return Vec::new();
        };
        let Some(prefer) = prefer.as_array() else {
            return vec![self.error(doc.id, "prefer must be a list of methods").at("prefer")];
        };
        let install = doc.object("install");
        prefer
            .iter()
            .enumerate()
            .filter_map(|(i, m)| {
                let declared = m
                    .as_str()
                    .is_some_and(|m| install.is_some_and(|inst| inst.contains_key(m)));
                (!declared).then(|| {
                    self.error(
                        doc.id,
                        format!("prefer names '{}' which is not an install method", display(m)),
                    )
                    .at(format!("prefer[{}]", i))
                })
            })
            .collect()
    }
}

fn display(value: &Value) -> String {
    value
        .as_str()
        .map(String::from)
        .unwrap_or_else(|| value.to_string())
}
