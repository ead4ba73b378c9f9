//! Cross-recipe rules: dependency references and cycles.

use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

use crate::lint::{LintRule, RuleId, SchemaError};

fn binary_deps(recipe: &Value) -> Vec<&str> {
    recipe
        .get("requires")
        .and_then(|r| r.get("binaries"))
        .and_then(Value::as_array)
        .map(|b| b.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// `requires.binaries` must name recipes in the catalog.
pub struct UndefinedDependencyRule;

impl LintRule for UndefinedDependencyRule {
    fn id(&self) -> RuleId {
        RuleId::new("undefined-dependency")
    }

    fn name(&self) -> &str {
        "Undefined Dependency"
    }

    fn description(&self) -> &str {
        "Ensures every required binary has a recipe"
    }

    fn check_catalog(&self, catalog: &BTreeMap<String, Value>) -> Vec<SchemaError> {
        let mut diagnostics = Vec::new();
        for (id, recipe) in catalog {
            for dep in binary_deps(recipe) {
                if !catalog.contains_key(dep) {
                    diagnostics.push(
                        self.error(id, format!("Requires undefined recipe '{}'", dep))
                            .at("requires.binaries"),
                    );
                }
            }
        }
        diagnostics
    }
}

/// Detects dependency cycles between recipes.
pub struct CircularDependencyRule;

impl LintRule for CircularDependencyRule {
    fn id(&self) -> RuleId {
        RuleId::new("circular-dependency")
    }

    fn name(&self) -> &str {
        "Circular Dependency"
    }

    fn description(&self) -> &str {
        "Detects circular dependencies in requires.binaries"
    }

    fn check_catalog(&self, catalog: &BTreeMap<String, Value>) -> Vec<SchemaError> {
        let mut diagnostics = Vec::new();
        let mut reported = HashSet::new();

        for id in catalog.keys() {
            if let Some(cycle) = find_cycle(catalog, id) {
                let cycle_key = {
                    let mut sorted = cycle.clone();
                    sorted.sort();
                    sorted.dedup();
                    sorted.join(",")
                };
                if reported.insert(cycle_key) {
                    diagnostics.push(self.error(
                        id,
                        format!("Circular dependency detected: {}", cycle.join(" -> ")),
                    ));
                }
            }
        }
        diagnostics
    }
}

fn find_cycle(catalog: &BTreeMap<String, Value>, start: &str) -> Option<Vec<String>> {
    let mut visited = HashSet::new();
    let mut path = Vec::new();
    dfs(catalog, start, &mut visited, &mut path)
}

fn dfs(
    catalog: &BTreeMap<String, Value>,
    current: &str,
    visited: &mut HashSet<String>,
    path: &mut Vec<String>,
) -> Option<Vec<String>> {
    if let Some(pos) = path.iter().position(|p| p == current) {
        let mut cycle = path[pos..].to_vec();
        cycle.push(current.to_string());
        return Some(cycle);
    }
    if !visited.insert(current.to_string()) {
        return None;
    }

    path.push(current.to_string());
    if let Some(recipe) = catalog.get(current) {
        for dep in binary_deps(recipe) {
            if let Some(cycle) = dfs(catalog, dep, visited, path) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    None
}
