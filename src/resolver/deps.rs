//! Dependency collection.
//!
//! Walks a tool's `requires.binaries` depth first so every dependency lands
//! earlier in the plan than the tool needing it. System packages from every
//! tool in the chain, and the packages of tools installed through the
//! primary package manager, are merged into one batch so the user sees a
//! single sudo-prompting package install instead of one per tool.

use std::collections::HashSet;
use tracing::debug;

use super::method::{pick_install_method, MethodContext};
use super::source;
use super::RecipeView;
use crate::error::ResolutionError;
use crate::profile::{Host, SystemProfile};
use crate::recipe::ToolRecipe;
use crate::steps::{Step, StepAction};

/// Everything gathered for one plan.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    /// Packages for the single batched install, in first-seen order.
    pub batch_packages: Vec<String>,
    /// Repository bootstrap steps, in dependency order.
    pub repo_setup: Vec<Step>,
    /// Standalone install steps, in dependency order, not yet env-wrapped.
    pub tool_steps: Vec<Step>,
    /// Tools whose install is folded into the package batch.
    pub batched_tools: Vec<String>,
    /// Every tool being installed, in dependency order.
    pub installed: Vec<String>,
    /// `(tool, post_env)` in dependency order.
    pub post_env: Vec<(String, String)>,
    /// Tool → chosen method.
    pub methods: Vec<(String, String)>,
}

impl Collection {
    /// Combined `post_env` of the tools collected before `tool`.
    pub fn env_before(&self, tool: &str) -> Option<String> {
        let position = self.installed.iter().position(|t| t == tool)?;
        let earlier: Vec<&str> = self.installed[..position]
            .iter()
            .filter_map(|t| self.env_of(t))
            .collect();
        join_env(&earlier)
    }

    /// Combined `post_env` of every collected tool.
    pub fn env_all(&self) -> Option<String> {
        let all: Vec<&str> = self.post_env.iter().map(|(_, e)| e.as_str()).collect();
        join_env(&all)
    }

    pub fn method_of(&self, tool: &str) -> Option<&str> {
        self.methods
            .iter()
            .find(|(t, _)| t == tool)
            .map(|(_, m)| m.as_str())
    }

    fn env_of(&self, tool: &str) -> Option<&str> {
        self.post_env
            .iter()
            .find(|(t, _)| t == tool)
            .map(|(_, e)| e.as_str())
    }

    fn add_packages(&mut self, packages: impl IntoIterator<Item = String>) {
        for pkg in packages {
            if !self.batch_packages.contains(&pkg) {
                self.batch_packages.push(pkg);
            }
        }
    }
}

fn join_env(parts: &[&str]) -> Option<String> {
    let joined = parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    (!joined.is_empty()).then_some(joined)
}

/// Binary probed to decide whether a tool is installed.
pub fn cli_name<'a>(id: &'a str, tool: &'a ToolRecipe) -> &'a str {
    tool.base.cli.as_deref().unwrap_or(id)
}

/// Package names from a package-manager install argv
/// (`apt-get install -y a b` → `[a, b]`).
///
/// Returns `None` when the command carries options other than the
/// non-interactive flags, since those would be lost in a merged batch.
pub fn batchable_packages(command: &[String]) -> Option<Vec<String>> {
    const VERBS: &[&str] = &["install", "add", "-S"];
    const QUIET_FLAGS: &[&str] = &["-y", "--yes", "--noconfirm", "-q", "--quiet", "--no-cache"];

    let verb = command.iter().position(|t| VERBS.contains(&t.as_str()))?;
    let mut packages = Vec::new();
    for token in &command[verb + 1..] {
        if token.starts_with('-') {
            if !QUIET_FLAGS.contains(&token.as_str()) {
                return None;
            }
        } else {
            packages.push(token.clone());
        }
    }
    (!packages.is_empty()).then_some(packages)
}

/// Depth-first collector.
pub struct Collector<'a> {
    recipes: &'a RecipeView<'a>,
    profile: &'a SystemProfile,
    host: &'a dyn Host,
    /// The tool the plan is for, named in errors.
    target: &'a str,
    visited: HashSet<String>,
    pub collection: Collection,
}

impl<'a> Collector<'a> {
    pub fn new(
        recipes: &'a RecipeView<'a>,
        profile: &'a SystemProfile,
        host: &'a dyn Host,
        target: &'a str,
    ) -> Self {
        Self {
            recipes,
            profile,
            host,
            target,
            visited: HashSet::new(),
            collection: Collection::default(),
        }
    }

    /// Collect `tool_id` and everything it needs.
    pub fn collect(&mut self, tool_id: &str) -> Result<(), ResolutionError> {
        if !self.visited.insert(tool_id.to_string()) {
            return Ok(());
        }

        let Some(tool) = self.recipes.tool(tool_id) else {
            return Err(if tool_id == self.target {
                ResolutionError::UnknownTool {
                    tool: tool_id.to_string(),
                }
            } else {
                ResolutionError::DependencyUnresolvable {
                    tool: self.target.to_string(),
                    dependency: tool_id.to_string(),
                }
            });
        };

        if tool_id != self.target && self.host.has_binary(cli_name(tool_id, tool)) {
            debug!("{} already on PATH, skipping", tool_id);
            return Ok(());
        }

        for dep in &tool.requires.binaries {
            self.collect(dep)?;
        }

        let family = &self.profile.distro.family;
        if let Some(packages) = tool.requires.packages.get(family) {
            let pm = &self.profile.package_manager.primary;
            let missing = self.host.missing_packages(pm, packages);
            self.collection.add_packages(missing);
        }

        let ctx = MethodContext::new(self.profile, self.host);
        let Some(method) = pick_install_method(tool, &ctx) else {
            return Err(if tool_id == self.target {
                ResolutionError::NoInstallMethod {
                    tool: tool_id.to_string(),
                    unavailable: super::method::unavailable_methods(tool, &ctx),
                }
            } else {
                ResolutionError::DependencyUnresolvable {
                    tool: self.target.to_string(),
                    dependency: tool_id.to_string(),
                }
            });
        };
        debug!("{}: install via {}", tool_id, method);

        let primary = self.profile.package_manager.primary.as_str();
        if method == primary {
            self.add_repo_setup(tool_id, tool);
        }

        let batched = method == primary
            && tool
                .install_command(&method)
                .and_then(|cmd| batchable_packages(cmd))
                .map(|pkgs| self.collection.add_packages(pkgs))
                .is_some();

        if batched {
            self.collection.batched_tools.push(tool_id.to_string());
        } else if method == "source" {
            if let Some(spec) = tool.source_spec() {
                let plan = source::expand(tool_id, tool, spec, self.profile, self.host);
                self.collection.add_packages(plan.toolchain_packages);
                self.collection.tool_steps.extend(plan.steps);
            }
        } else if let Some(command) = tool.install_command(&method) {
            let step = Step::new(
                format!("Install {}", tool.base.label),
                StepAction::Tool {
                    command: command.clone(),
                    script_sha256: None,
                    cwd: None,
                },
            )
            .with_sudo(tool.method_needs_sudo(&method))
            .with_tool(tool_id)
            .with_method(method.clone());
            self.collection.tool_steps.push(step);
        }

        self.collection.installed.push(tool_id.to_string());
        self.collection
            .methods
            .push((tool_id.to_string(), method));
        if let Some(env) = tool.post_env.as_ref().filter(|e| !e.trim().is_empty()) {
            self.collection
                .post_env
                .push((tool_id.to_string(), env.clone()));
        }
        Ok(())
    }

    fn add_repo_setup(&mut self, tool_id: &str, tool: &ToolRecipe) {
        let Some(specs) = tool.repo_setup.get(&self.profile.distro.family) else {
            return;
        };
        if specs.is_empty() {
            return;
        }
        let needs_sudo = specs.iter().any(|s| s.needs_sudo);
        let step = Step::new(
            format!("Configure {} repository", tool.base.label),
            StepAction::RepoSetup {
                steps: specs.clone(),
            },
        )
        .with_sudo(needs_sudo)
        .with_tool(tool_id);
        self.collection.repo_setup.push(step);
    }
}
