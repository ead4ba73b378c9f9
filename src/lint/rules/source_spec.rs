//! Build-from-source spec rule.

use serde_json::Value;

use crate::lint::rule::{is_command_list, RecipeDoc};
use crate::lint::{LintRule, RuleId, SchemaError};

const BUILD_SYSTEMS: &[&str] = &["autotools", "cmake", "make", "cargo", "meson", "go", "custom"];

const SOURCE_FIELDS: &[&str] = &[
    "git_repo",
    "branch",
    "depth",
    "tarball_url",
    "default_version",
    "build_system",
    "requires_toolchain",
    "configure_args",
    "build_commands",
    "install_prefix",
    "build_timeout",
];

/// Validates `install.source`.
pub struct SourceSpecRule;

impl LintRule for SourceSpecRule {
    fn id(&self) -> RuleId {
        RuleId::new("source-spec")
    }

    fn name(&self) -> &str {
        "Source Spec"
    }

    fn description(&self) -> &str {
        "Validates build-from-source specifications"
    }

    fn check(&self, doc: &RecipeDoc<'_>) -> Vec<SchemaError> {
        let Some(source) = doc.object("install").and_then(|i| i.get("source")) else {
            return Vec::new();
        };
        let path = "install.source";
        let Some(spec) = source.as_object() else {
            return vec![self
                .error(doc.id, "source must be a build specification mapping")
                .at(path)];
        };

        let mut diagnostics = Vec::new();
        let mut err = |message: String| diagnostics.push(self.error(doc.id, message).at(path));

        for key in spec.keys() {
            if !SOURCE_FIELDS.contains(&key.as_str()) {
                err(format!("Unknown source field '{}'", key));
            }
        }

        let git = spec.get("git_repo").and_then(Value::as_str);
        let tarball = spec.get("tarball_url").and_then(Value::as_str);
        match (git, tarball) {
            (Some(_), Some(_)) => err("Declare only one of git_repo or tarball_url".into()),
            (None, None) => err("Declare one of git_repo or tarball_url".into()),
            _ => {}
        }

        match spec.get("build_system").and_then(Value::as_str) {
            Some(bs) if BUILD_SYSTEMS.contains(&bs) => {
                if bs == "custom" && !spec.get("build_commands").is_some_and(is_command_list) {
                    err("build_system 'custom' requires build_commands".into());
                }
            }
            Some(bs) => err(format!(
                "Unknown build_system '{}' (expected one of {})",
                bs,
                BUILD_SYSTEMS.join(", ")
            )),
            None => err("Missing required field: build_system".into()),
        }

        match spec.get("requires_toolchain") {
            Some(Value::Array(items)) if items.iter().all(Value::is_string) => {}
            Some(_) => err("requires_toolchain must be a list of binaries".into()),
            None => err("Missing required field: requires_toolchain".into()),
        }

        if tarball.is_some_and(|t| t.contains("{version}")) && !spec.contains_key("default_version") {
            err("tarball_url uses {version} but no default_version is declared".into());
        }

        if git.is_none() {
            for key in ["branch", "depth"] {
                if spec.contains_key(key) {
                    err(format!("'{}' is only valid with git_repo", key));
                }
            }
        }

        if let Some(depth) = spec.get("depth") {
            if !depth.as_u64().is_some_and(|d| d > 0) {
                err("depth must be a positive integer".into());
            }
        }

        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(source: Value) -> Vec<SchemaError> {
        let value = json!({"label": "t", "install": {"source": source}});
        let obj = value.as_object().unwrap().clone();
        SourceSpecRule.check(&RecipeDoc::new("t", &obj))
    }

    #[test]
    fn valid_git_spec_passes() {
        let diags = run(json!({
            "git_repo": "https://github.com/tmux/tmux",
            "branch": "master",
            "depth": 1,
            "build_system": "autotools",
            "requires_toolchain": ["gcc", "make"]
        }));
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn both_acquisition_fields_rejected() {
        let diags = run(json!({
            "git_repo": "https://x",
            "tarball_url": "https://x.tar.gz",
            "build_system": "make",
            "requires_toolchain": []
        }));
        assert!(diags.iter().any(|d| d.message.contains("only one")));
    }

    #[test]
    fn version_placeholder_needs_default() {
        let diags = run(json!({
            "tarball_url": "https://x/v{version}.tar.gz",
            "build_system": "cmake",
            "requires_toolchain": ["cmake"]
        }));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("default_version"));
    }

    #[test]
    fn branch_without_git_rejected() {
        let diags = run(json!({
            "tarball_url": "https://x.tar.gz",
            "branch": "main",
            "build_system": "make",
            "requires_toolchain": ["make"]
        }));
        assert_eq!(diags.len(), 1);
    }

    #[test]
    fn reports_every_problem() {
        let diags = run(json!({"build_system": "bazel", "colour": "red"}));
        // unknown field, no acquisition, bad build system, no toolchain
        assert_eq!(diags.len(), 4);
    }

    #[test]
    fn custom_needs_commands() {
        let diags = run(json!({
            "git_repo": "https://x",
            "build_system": "custom",
            "requires_toolchain": ["make"]
        }));
        assert_eq!(diags.len(), 1);
    }
}
