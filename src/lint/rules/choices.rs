//! Choice, input and variant rules.

use serde_json::Value;
use std::collections::HashSet;

use super::OS_FAMILIES;
use crate::lint::rule::RecipeDoc;
use crate::lint::{LintRule, RuleId, SchemaError};
use crate::profile::ProfileKey;
use crate::recipe::Condition;

const INPUT_KINDS: &[&str] = &["text", "number", "bool", "select", "path", "secret"];
const VERSION_SOURCES: &[&str] = &["static", "package_manager", "dynamic"];

/// Validates `choices`, `version_choice`, `inputs`, and `install_variants`.
pub struct ChoicesRule;

impl LintRule for ChoicesRule {
    fn id(&self) -> RuleId {
        RuleId::new("choices")
    }

    fn name(&self) -> &str {
        "Choices and Inputs"
    }

    fn description(&self) -> &str {
        "Validates user choices, inputs, and the variants they select"
    }

    fn check(&self, doc: &RecipeDoc<'_>) -> Vec<SchemaError> {
        let mut diagnostics = Vec::new();
        let mut choice_ids = HashSet::new();
        let mut option_ids = HashSet::new();

        if let Some(choices) = doc.get("choices") {
            match choices.as_array() {
                Some(choices) => {
                    for (i, choice) in choices.iter().enumerate() {
                        self.check_choice(doc.id, i, choice, &mut choice_ids, &mut option_ids, &mut diagnostics);
                    }
                }
                None => diagnostics.push(self.error(doc.id, "choices must be a list").at("choices")),
            }
        }

        if let Some(vc) = doc.object("version_choice") {
            match vc.get("source").and_then(Value::as_str) {
                Some("dynamic") if !vc.get("github_repo").is_some_and(Value::is_string) => {
                    diagnostics.push(
                        self.error(doc.id, "dynamic version_choice requires github_repo")
                            .at("version_choice"),
                    );
                }
                Some("static") if !vc.get("options").is_some_and(Value::is_array) => {
                    diagnostics.push(
                        self.error(doc.id, "static version_choice requires options")
                            .at("version_choice"),
                    );
                }
                Some(s) if VERSION_SOURCES.contains(&s) => {}
                _ => diagnostics.push(
                    self.error(
                        doc.id,
                        format!("version_choice source must be one of {}", VERSION_SOURCES.join(", ")),
                    )
                    .at("version_choice.source"),
                ),
            }
        }

        if let Some(inputs) = doc.array("inputs") {
            diagnostics.extend(self.check_inputs(doc.id, "inputs", inputs, &choice_ids));
        }

        if let Some(variants) = doc.object("install_variants") {
            for key in variants.keys() {
                if !option_ids.contains(key.as_str()) {
                    diagnostics.push(
                        self.error(
                            doc.id,
                            format!("install_variants key '{}' matches no choice option", key),
                        )
                        .at(format!("install_variants.{}", key)),
                    );
                }
            }
        }

        diagnostics
    }
}

impl ChoicesRule {
    fn check_choice<'a>(
        &self,
        recipe: &str,
        index: usize,
        choice: &'a Value,
        choice_ids: &mut HashSet<&'a str>,
        option_ids: &mut HashSet<&'a str>,
        diagnostics: &mut Vec<SchemaError>,
    ) {
        let path = format!("choices[{}]", index);
        let Some(obj) = choice.as_object() else {
            diagnostics.push(self.error(recipe, "Choice must be a mapping").at(path));
            return;
        };
        match obj.get("id").and_then(Value::as_str) {
            Some(id) => {
                if !choice_ids.insert(id) {
                    diagnostics.push(self.error(recipe, format!("Duplicate choice id '{}'", id)).at(path.clone()));
                }
            }
            None => diagnostics.push(self.error(recipe, "Choice is missing an id").at(path.clone())),
        }
        if !obj.get("label").is_some_and(Value::is_string) {
            diagnostics.push(self.error(recipe, "Choice is missing a label").at(path.clone()));
        }

        let Some(options) = obj.get("options").and_then(Value::as_array).filter(|o| !o.is_empty()) else {
            diagnostics.push(self.error(recipe, "Choice must declare options").at(path));
            return;
        };

        let mut seen = HashSet::new();
        let mut defaults = 0;
        for (j, option) in options.iter().enumerate() {
            let at = format!("{}.options[{}]", path, j);
            let Some(opt) = option.as_object() else {
                diagnostics.push(self.error(recipe, "Option must be a mapping").at(at));
                continue;
            };
            match opt.get("id").and_then(Value::as_str) {
                Some(id) => {
                    if !seen.insert(id) {
                        diagnostics.push(self.error(recipe, format!("Duplicate option id '{}'", id)).at(at.clone()));
                    }
                    option_ids.insert(id);
                }
                None => diagnostics.push(self.error(recipe, "Option is missing an id").at(at.clone())),
            }
            if opt.get("default").and_then(Value::as_bool) == Some(true) {
                defaults += 1;
            }
            if let Some(req) = opt.get("requires").and_then(Value::as_object) {
                if let Some(hw) = req.get("hardware").and_then(Value::as_object) {
                    for key in hw.keys() {
                        if key.parse::<ProfileKey>().is_err() {
                            diagnostics.push(
                                self.error(recipe, format!("Unknown profile key '{}'", key))
                                    .at(format!("{}.requires.hardware", at)),
                            );
                        }
                    }
                }
                if let Some(platforms) = req.get("platforms").and_then(Value::as_array) {
                    for p in platforms {
                        let known = p
                            .as_str()
                            .is_some_and(|p| OS_FAMILIES.contains(&p) || p == "linux");
                        if !known {
                            diagnostics.push(
                                self.error(recipe, format!("Unknown platform {}", p))
                                    .at(format!("{}.requires.platforms", at)),
                            );
                        }
                    }
                }
            }
        }
        if defaults > 1 {
            diagnostics.push(self.error(recipe, "Choice declares more than one default option").at(path));
        }
    }

    fn check_inputs(
        &self,
        recipe: &str,
        path: &str,
        inputs: &[Value],
        choice_ids: &HashSet<&str>,
    ) -> Vec<SchemaError> {
        let mut diagnostics = Vec::new();
        let mut seen = HashSet::new();
        for (i, input) in inputs.iter().enumerate() {
            let at = format!("{}[{}]", path, i);
            let Some(obj) = input.as_object() else {
                diagnostics.push(self.error(recipe, "Input must be a mapping").at(at));
                continue;
            };
            match obj.get("id").and_then(Value::as_str) {
                Some(id) if !seen.insert(id) => {
                    diagnostics.push(self.error(recipe, format!("Duplicate input id '{}'", id)).at(at.clone()))
                }
                Some(_) => {}
                None => diagnostics.push(self.error(recipe, "Input is missing an id").at(at.clone())),
            }
            let kind = obj.get("type").and_then(Value::as_str).unwrap_or("text");
            if !INPUT_KINDS.contains(&kind) {
                diagnostics.push(self.error(recipe, format!("Unknown input type '{}'", kind)).at(at.clone()));
            }
            if kind == "select" && !obj.get("options").and_then(Value::as_array).is_some_and(|o| !o.is_empty()) {
                diagnostics.push(self.error(recipe, "select input requires options").at(at.clone()));
            }
            if let Some(pattern) = obj.get("pattern").and_then(Value::as_str) {
                if regex::Regex::new(pattern).is_err() {
                    diagnostics.push(self.error(recipe, format!("Invalid input pattern '{}'", pattern)).at(at.clone()));
                }
            }
            if let Some(cond) = obj.get("condition").and_then(Value::as_object) {
                if let Some(choice) = cond.get("choice").and_then(Value::as_str) {
                    if !choice_ids.contains(choice) {
                        diagnostics.push(
                            self.error(recipe, format!("Input condition references unknown choice '{}'", choice))
                                .at(at.clone()),
                        );
                    }
                }
                if let Some(flag) = cond.get("profile").and_then(Value::as_str) {
                    if !Condition::NAMES.contains(&flag) {
                        diagnostics.push(self.error(recipe, format!("Unknown condition '{}'", flag)).at(at));
                    }
                }
            }
        }
        diagnostics
    }
}
