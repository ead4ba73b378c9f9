//! Recipe shape rules: kind, required fields, closed field sets, value types.

use serde_json::Value;

use super::{COMMAND_STEP_FIELDS, OS_FAMILIES, RESTART_SCOPES, RISK_LEVELS};
use crate::lint::rule::{is_string_list, RecipeDoc};
use crate::lint::{LintRule, RuleId, SchemaError};
use crate::recipe::Condition;

const BASE_FIELDS: &[&str] = &[
    "type",
    "label",
    "description",
    "category",
    "risk",
    "cli",
    "verify",
    "update",
    "rollback",
    "remove",
    "restart_required",
    "version_constraint",
];

const TOOL_FIELDS: &[&str] = &[
    "install",
    "needs_sudo",
    "requires",
    "prefer",
    "choices",
    "version_choice",
    "inputs",
    "install_variants",
    "post_install",
    "post_env",
    "repo_setup",
    "on_failure",
];

const DATA_PACK_FIELDS: &[&str] = &["steps", "inputs", "freshness_days"];

const CONFIG_FIELDS: &[&str] = &["config_templates"];

/// Every field legal on a recipe of `kind`.
pub fn allowed_fields(kind: &str) -> Vec<&'static str> {
    let extra = match kind {
        "tool" => TOOL_FIELDS,
        "data_pack" => DATA_PACK_FIELDS,
        "config" => CONFIG_FIELDS,
        _ => &[],
    };
    BASE_FIELDS.iter().chain(extra).copied().collect()
}

/// The recipe's kind must be explicit or inferable.
pub struct RecipeTypeRule;

impl LintRule for RecipeTypeRule {
    fn id(&self) -> RuleId {
        RuleId::new("recipe-type")
    }

    fn name(&self) -> &str {
        "Recipe Type"
    }

    fn description(&self) -> &str {
        "Ensures the recipe kind is known or inferable"
    }

    fn check(&self, doc: &RecipeDoc<'_>) -> Vec<SchemaError> {
        if doc.kind.is_some() {
            return Vec::new();
        }
        let err = match doc.get("type").and_then(Value::as_str) {
            Some(t) => self
                .error(doc.id, format!("Unknown recipe type '{}'", t))
                .at("type"),
            None => self.error(doc.id, "Cannot infer recipe type").with_suggestion(
                "Add an 'install' map (tool), 'steps' list (data_pack), or 'config_templates' (config)",
            ),
        };
        vec![err]
    }
}

/// Required fields per kind.
pub struct RequiredFieldsRule;

impl LintRule for RequiredFieldsRule {
    fn id(&self) -> RuleId {
        RuleId::new("required-fields")
    }

    fn name(&self) -> &str {
        "Required Fields"
    }

    fn description(&self) -> &str {
        "Ensures all required recipe fields are present"
    }

    fn check(&self, doc: &RecipeDoc<'_>) -> Vec<SchemaError> {
        let mut diagnostics = Vec::new();

        if !doc.get("label").is_some_and(Value::is_string) {
            diagnostics.push(self.error(doc.id, "Missing required field: label"));
        }

        let required: &[&str] = match doc.kind {
            Some("tool") => &["install"],
            Some("data_pack") => &["steps"],
            Some("config") => &["config_templates"],
            _ => &[],
        };
        for field in required {
            if !doc.fields.contains_key(*field) {
                diagnostics.push(self.error(doc.id, format!("Missing required field: {}", field)));
            }
        }

        diagnostics
    }
}

/// Recipes have a closed field set per kind.
pub struct UnknownFieldsRule;

impl LintRule for UnknownFieldsRule {
    fn id(&self) -> RuleId {
        RuleId::new("unknown-field")
    }

    fn name(&self) -> &str {
        "Unknown Field"
    }

    fn description(&self) -> &str {
        "Rejects fields the recipe kind does not define"
    }

    fn check(&self, doc: &RecipeDoc<'_>) -> Vec<SchemaError> {
        let Some(kind) = doc.kind else {
            return Vec::new();
        };
        let allowed = allowed_fields(kind);
        let mut diagnostics: Vec<SchemaError> = doc
            .fields
            .keys()
            .filter(|k| !allowed.contains(&k.as_str()))
            .map(|k| {
                self.error(doc.id, format!("Unknown field '{}' for a {} recipe", k, kind))
                    .at(k.clone())
            })
            .collect();

        if let Some(steps) = doc.array("post_install") {
            diagnostics.extend(self.check_step_fields(doc.id, "post_install", steps));
        }
        if let Some(families) = doc.object("repo_setup") {
            for (family, steps) in families {
                if let Some(steps) = steps.as_array() {
                    diagnostics.extend(self.check_step_fields(
                        doc.id,
                        &format!("repo_setup.{}", family),
                        steps,
                    ));
                }
            }
        }
        diagnostics
    }
}

impl UnknownFieldsRule {
    fn check_step_fields(&self, recipe: &str, path: &str, steps: &[Value]) -> Vec<SchemaError> {
        let mut diagnostics = Vec::new();
        for (i, step) in steps.iter().enumerate() {
            let Some(obj) = step.as_object() else {
                continue;
            };
            for key in obj.keys() {
                if !COMMAND_STEP_FIELDS.contains(&key.as_str()) {
                    diagnostics.push(
                        self.error(recipe, format!("Unknown step field '{}'", key))
                            .at(format!("{}[{}]", path, i)),
                    );
                }
            }
        }
        diagnostics
    }
}

/// Value types and enumerations of common fields.
pub struct FieldTypesRule;

impl LintRule for FieldTypesRule {
    fn id(&self) -> RuleId {
        RuleId::new("field-types")
    }

    fn name(&self) -> &str {
        "Field Types"
    }

    fn description(&self) -> &str {
        "Checks value types and enumerated values of recipe fields"
    }

    fn check(&self, doc: &RecipeDoc<'_>) -> Vec<SchemaError> {
        let mut diagnostics = Vec::new();

        if let Some(risk) = doc.get("risk") {
            if !risk.as_str().is_some_and(|r| RISK_LEVELS.contains(&r)) {
                diagnostics.push(
                    self.error(doc.id, format!("risk must be one of {}", RISK_LEVELS.join(", ")))
                        .at("risk"),
                );
            }
        }

        if let Some(scope) = doc.get("restart_required") {
            if !scope.as_str().is_some_and(|s| RESTART_SCOPES.contains(&s)) {
                diagnostics.push(
                    self.error(
                        doc.id,
                        format!("restart_required must be one of {}", RESTART_SCOPES.join(", ")),
                    )
                    .at("restart_required"),
                );
            }
        }

        if let Some(verify) = doc.get("verify") {
            if !is_string_list(verify) {
                diagnostics.push(
                    self.error(doc.id, "verify must be a command (list of strings)")
                        .at("verify"),
                );
            }
        }

        for map_field in ["update", "rollback", "remove"] {
            let Some(value) = doc.get(map_field) else {
                continue;
            };
            match value.as_object() {
                Some(map) => {
                    for (method, cmd) in map {
                        if !is_string_list(cmd) {
                            diagnostics.push(
                                self.error(doc.id, "Command must be a list of strings")
                                    .at(format!("{}.{}", map_field, method)),
                            );
                        }
                    }
                }
                None => diagnostics.push(
                    self.error(doc.id, "Must be a method-keyed map of commands")
                        .at(map_field),
                ),
            }
        }

        if let Some(requires) = doc.get("requires") {
            diagnostics.extend(self.check_requires(doc.id, requires));
        }

        if let Some(steps) = doc.get("post_install") {
            diagnostics.extend(self.check_command_steps(doc.id, "post_install", steps));
        }

        if let Some(repo_setup) = doc.get("repo_setup") {
            match repo_setup.as_object() {
                Some(families) => {
                    for (family, steps) in families {
                        let path = format!("repo_setup.{}", family);
                        if !OS_FAMILIES.contains(&family.as_str()) {
                            diagnostics.push(
                                self.error(doc.id, format!("Unknown OS family '{}'", family))
                                    .at(path.clone()),
                            );
                        }
                        diagnostics.extend(self.check_command_steps(doc.id, &path, steps));
                    }
                }
                None => diagnostics.push(
                    self.error(doc.id, "repo_setup must be keyed by OS family")
                        .at("repo_setup"),
                ),
            }
        }

        if let Some(post_env) = doc.get("post_env") {
            if !post_env.is_string() {
                diagnostics.push(self.error(doc.id, "post_env must be a string").at("post_env"));
            }
        }

        if let Some(templates) = doc.array("config_templates") {
            for (i, template) in templates.iter().enumerate() {
                diagnostics.extend(self.check_template(doc.id, i, template));
            }
        }

        diagnostics
    }
}

const CONFIG_FORMATS: &[&str] = &["raw", "json", "yaml", "ini", "env"];

impl FieldTypesRule {
    fn check_template(&self, recipe: &str, index: usize, template: &Value) -> Vec<SchemaError> {
        let at = format!("config_templates[{}]", index);
        let Some(obj) = template.as_object() else {
            return vec![self.error(recipe, "Template must be a mapping").at(at)];
        };
        let mut diagnostics = Vec::new();
        for field in ["id", "file", "template"] {
            if !obj.get(field).is_some_and(Value::is_string) {
                diagnostics.push(
                    self.error(recipe, format!("Template is missing '{}'", field))
                        .at(at.clone()),
                );
            }
        }
        if let Some(format) = obj.get("format") {
            if !format.as_str().is_some_and(|f| CONFIG_FORMATS.contains(&f)) {
                diagnostics.push(
                    self.error(
                        recipe,
                        format!("format must be one of {}", CONFIG_FORMATS.join(", ")),
                    )
                    .at(at.clone()),
                );
            }
        }
        if let Some(cmd) = obj.get("post_command") {
            if !is_string_list(cmd) {
                diagnostics.push(
                    self.error(recipe, "post_command must be a list of strings")
                        .at(at),
                );
            }
        }
        diagnostics
    }
}

impl FieldTypesRule {
    fn check_requires(&self, recipe: &str, requires: &Value) -> Vec<SchemaError> {
        let mut diagnostics = Vec::new();
        let Some(obj) = requires.as_object() else {
            return vec![self.error(recipe, "requires must be a mapping").at("requires")];
        };
        for key in obj.keys() {
            if key != "binaries" && key != "packages" {
                diagnostics.push(
                    self.error(recipe, format!("Unknown requires field '{}'", key))
                        .at("requires"),
                );
            }
        }
        if let Some(binaries) = obj.get("binaries") {
            if !binaries
                .as_array()
                .is_some_and(|b| b.iter().all(Value::is_string))
            {
                diagnostics.push(
                    self.error(recipe, "binaries must be a list of recipe ids")
                        .at("requires.binaries"),
                );
            }
        }
        if let Some(packages) = obj.get("packages") {
            diagnostics.extend(check_family_packages(self, recipe, "requires.packages", packages));
        }
        diagnostics
    }

    fn check_command_steps(&self, recipe: &str, path: &str, steps: &Value) -> Vec<SchemaError> {
        let Some(steps) = steps.as_array() else {
            return vec![self.error(recipe, "Must be a list of steps").at(path)];
        };
        let mut diagnostics = Vec::new();
        for (i, step) in steps.iter().enumerate() {
            let at = format!("{}[{}]", path, i);
            let Some(obj) = step.as_object() else {
                diagnostics.push(self.error(recipe, "Step must be a mapping").at(at));
                continue;
            };
            if !obj.get("label").is_some_and(Value::is_string) {
                diagnostics.push(self.error(recipe, "Step is missing a label").at(at.clone()));
            }
            if !obj.get("command").is_some_and(is_string_list) {
                diagnostics.push(
                    self.error(recipe, "Step command must be a list of strings")
                        .at(at.clone()),
                );
            }
            if let Some(cond) = obj.get("condition") {
                if !cond.as_str().is_some_and(|c| Condition::NAMES.contains(&c)) {
                    diagnostics.push(
                        self.error(
                            recipe,
                            format!("condition must be one of {}", Condition::NAMES.join(", ")),
                        )
                        .at(at),
                    );
                }
            }
        }
        diagnostics
    }
}

/// Check a family-keyed package map.
pub fn check_family_packages(
    rule: &impl LintRule,
    recipe: &str,
    path: &str,
    packages: &Value,
) -> Vec<SchemaError> {
    let Some(map) = packages.as_object() else {
        return vec![SchemaError::new(
            rule.id(),
            rule.default_severity(),
            recipe,
            "packages must be keyed by OS family",
        )
        .at(path)];
    };
    let mut diagnostics = Vec::new();
    for (family, list) in map {
        if !OS_FAMILIES.contains(&family.as_str()) {
            diagnostics.push(
                SchemaError::new(
                    rule.id(),
                    rule.default_severity(),
                    recipe,
                    format!("Unknown OS family '{}'", family),
                )
                .at(format!("{}.{}", path, family))
                .with_suggestion(format!("Use one of: {}", OS_FAMILIES.join(", "))),
            );
        }
        if !is_string_list(list) {
            diagnostics.push(
                SchemaError::new(
                    rule.id(),
                    rule.default_severity(),
                    recipe,
                    "Package list must be a non-empty list of names",
                )
                .at(format!("{}.{}", path, family)),
            );
        }
    }
    diagnostics
}
