//! Update and remove.
//!
//! Both pick a command from the recipe's method-keyed `update`/`remove`
//! map with the same precedence as installs, run it as a single step, and
//! record the version the verify command reports before and after.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;
use tracing::info;

use super::rollback::{undo_command, UndoTarget};
use super::Engine;
use crate::error::ResolutionError;
use crate::recipe::{InstallSpec, Recipe, RecipeCatalog};
use crate::resolver::method::{pick_install_method, pick_method_command, MethodContext};
use crate::steps::{Step, StepAction, StepOutcome};

static VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+\.\d+(?:\.\d+)*(?:[-+][0-9A-Za-z.]+)?").expect("VERSION must compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Update,
    Remove,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleAction::Update => write!(f, "update"),
            LifecycleAction::Remove => write!(f, "remove"),
        }
    }
}

/// Result of an update or remove.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleOutcome {
    pub tool: String,
    pub action: LifecycleAction,
    pub method: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_version: Option<String>,
    pub outcome: StepOutcome,
}

/// The first version-looking token in `text`.
pub fn extract_version(text: &str) -> Option<String> {
    VERSION.find(text).map(|m| m.as_str().to_string())
}

impl Engine {
    /// Update an installed tool.
    pub fn update_tool(
        &self,
        catalog: &RecipeCatalog,
        tool_id: &str,
        sudo_password: Option<&str>,
    ) -> Result<LifecycleOutcome, ResolutionError> {
        self.run_lifecycle(catalog, tool_id, LifecycleAction::Update, sudo_password)
    }

    /// Remove an installed tool.
    pub fn remove_tool(
        &self,
        catalog: &RecipeCatalog,
        tool_id: &str,
        sudo_password: Option<&str>,
    ) -> Result<LifecycleOutcome, ResolutionError> {
        self.run_lifecycle(catalog, tool_id, LifecycleAction::Remove, sudo_password)
    }

    /// The version the recipe's verify command reports right now.
    pub fn installed_version(&self, recipe: &Recipe) -> Option<String> {
        let verify = recipe.base().verify.as_ref()?;
        let step = Step::new("Read version", StepAction::Verify { command: verify.clone() });
        let outcome = self.execute_step(&step, None, None);
        if !outcome.ok {
            return None;
        }
        extract_version(&outcome.stdout).or_else(|| extract_version(&outcome.stderr))
    }

    fn run_lifecycle(
        &self,
        catalog: &RecipeCatalog,
        tool_id: &str,
        action: LifecycleAction,
        sudo_password: Option<&str>,
    ) -> Result<LifecycleOutcome, ResolutionError> {
        let recipe = catalog.get(tool_id).ok_or_else(|| ResolutionError::UnknownTool {
            tool: tool_id.to_string(),
        })?;
        let tool = recipe.as_tool().ok_or_else(|| ResolutionError::UnsupportedRecipe {
            tool: tool_id.to_string(),
            kind: recipe.kind().to_string(),
            message: format!("only tools can be {}d", action),
        })?;

        let ctx = MethodContext::new(self.profile(), self.host());
        let installed_with = pick_install_method(tool, &ctx);
        let map = match action {
            LifecycleAction::Update => &recipe.base().update,
            LifecycleAction::Remove => &recipe.base().remove,
        };

        let (method, command, needs_sudo) =
            match pick_method_command(map, installed_with.as_deref(), &ctx) {
                Some((method, command)) => {
                    (method.to_string(), command.clone(), tool.method_needs_sudo(method))
                }
                None => {
                    let method = installed_with.ok_or_else(|| ResolutionError::NoInstallMethod {
                        tool: tool_id.to_string(),
                        unavailable: map.keys().cloned().collect(),
                    })?;
                    let (command, needs_sudo) = self
                        .fallback_command(tool_id, recipe, &method, action)
                        .ok_or_else(|| ResolutionError::UnsupportedRecipe {
                            tool: tool_id.to_string(),
                            kind: "tool".into(),
                            message: format!("no {} command for method '{}'", action, method),
                        })?;
                    (method, command, needs_sudo)
                }
            };

        let before_version = self.installed_version(recipe);
        info!("Running {} of {} via {}", action, tool_id, method);
        let step = Step::new(format!("{} {}", action, recipe.base().label), StepAction::Tool {
            command,
            script_sha256: None,
            cwd: None,
        })
        .with_sudo(needs_sudo)
        .with_tool(tool_id);
        let outcome = self.execute_step(&step, sudo_password, None);
        let after_version = match action {
            LifecycleAction::Update => self.installed_version(recipe),
            LifecycleAction::Remove => None,
        };

        Ok(LifecycleOutcome {
            tool: tool_id.to_string(),
            action,
            method,
            ok: outcome.ok,
            before_version,
            after_version,
            outcome,
        })
    }

    /// Without a declared command: update re-runs the install command,
    /// remove uses the method's undo entry.
    fn fallback_command(
        &self,
        tool_id: &str,
        recipe: &Recipe,
        method: &str,
        action: LifecycleAction,
    ) -> Option<(Vec<String>, bool)> {
        let tool = recipe.as_tool()?;
        match action {
            LifecycleAction::Update => match tool.install.get(method)? {
                InstallSpec::Command(command) => Some((command.clone(), tool.method_needs_sudo(method))),
                InstallSpec::Source(_) => None,
            },
            LifecycleAction::Remove => {
                let cli = recipe.base().cli.as_deref().unwrap_or(tool_id);
                let target = UndoTarget {
                    packages: vec![tool_id.to_string()],
                    binary_path: self.host().which(cli).map(|p| p.display().to_string()),
                    ..Default::default()
                };
                undo_command(method, &target)
            }
        }
    }
}
