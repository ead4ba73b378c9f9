//! The executable step type.
//!
//! A [`Step`] carries the fields every step shares (label, sudo, risk,
//! timeout) and a [`StepAction`] tagged by `type` with the type-specific
//! payload.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::recipe::{CommandSpec, CommandStepSpec, ConfigFormat, InputSpec, RestartScope};
use crate::risk::RiskLevel;

/// A single executable unit of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Step {
    /// Display label.
    pub label: String,

    #[serde(default)]
    pub needs_sudo: bool,

    /// Risk tag; inferred during plan assembly when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLevel>,

    /// Recipe this step installs, when it belongs to one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,

    /// Install method of the owning recipe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Timeout in seconds; the engine applies a per-type default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    /// Environment snippet sourced before the command (earlier tools' `post_env`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_env: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_required: Option<RestartScope>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_hint: Option<String>,

    /// Paths to back up before running.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backup_before: Vec<String>,

    #[serde(flatten)]
    pub action: StepAction,
}

/// Type-specific step payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepAction {
    /// Distro repository bootstrap; sub-steps run in order.
    RepoSetup { steps: Vec<CommandStepSpec> },

    /// One batched package-manager invocation.
    Packages {
        package_manager: String,
        packages: Vec<String>,
        command: CommandSpec,
    },

    /// Install a tool.
    Tool {
        command: CommandSpec,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        script_sha256: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
    },

    PostInstall {
        command: CommandSpec,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        script_sha256: Option<String>,
    },

    /// Prove the install works.
    Verify { command: CommandSpec },

    Config(ConfigStep),

    Download(DownloadStep),

    Service {
        service: String,
        action: ServiceAction,
    },

    GithubRelease(ReleaseStep),

    /// Append lines to the user's shell rc file.
    ShellConfig {
        lines: Vec<String>,
        /// Explicit rc file; detected from `$SHELL` when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        rc_file: Option<String>,
    },

    Notification { message: String },

    /// Build-directory install (e.g. `make install`).
    Install {
        command: CommandSpec,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
    },

    /// Remove a build directory.
    Cleanup { path: String },
}

impl StepAction {
    /// The `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            StepAction::RepoSetup { .. } => "repo_setup",
            StepAction::Packages { .. } => "packages",
            StepAction::Tool { .. } => "tool",
            StepAction::PostInstall { .. } => "post_install",
            StepAction::Verify { .. } => "verify",
            StepAction::Config(_) => "config",
            StepAction::Download(_) => "download",
            StepAction::Service { .. } => "service",
            StepAction::GithubRelease(_) => "github_release",
            StepAction::ShellConfig { .. } => "shell_config",
            StepAction::Notification { .. } => "notification",
            StepAction::Install { .. } => "install",
            StepAction::Cleanup { .. } => "cleanup",
        }
    }
}

impl Step {
    pub fn new(label: impl Into<String>, action: StepAction) -> Self {
        Self {
            label: label.into(),
            needs_sudo: false,
            risk: None,
            tool_id: None,
            method: None,
            timeout: None,
            post_env: None,
            restart_required: None,
            risk_description: None,
            rollback_hint: None,
            backup_before: Vec::new(),
            action,
        }
    }

    pub fn with_sudo(mut self, needs_sudo: bool) -> Self {
        self.needs_sudo = needs_sudo;
        self
    }

    pub fn with_tool(mut self, tool_id: impl Into<String>) -> Self {
        self.tool_id = Some(tool_id.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_post_env(mut self, post_env: Option<String>) -> Self {
        self.post_env = post_env.filter(|e| !e.trim().is_empty());
        self
    }

    /// Build a step from a recipe-declared command step.
    pub fn from_spec(spec: &CommandStepSpec, action: StepAction) -> Self {
        Self {
            label: spec.label.clone(),
            needs_sudo: spec.needs_sudo,
            risk: spec.risk,
            timeout: spec.timeout,
            restart_required: spec.restart_required,
            risk_description: spec.risk_description.clone(),
            rollback_hint: spec.rollback_hint.clone(),
            backup_before: spec.backup_before.clone(),
            ..Self::new(String::new(), action)
        }
    }

    /// The `type` tag.
    pub fn kind(&self) -> &'static str {
        self.action.kind()
    }

    /// The argv this step runs, for command-shaped steps.
    pub fn command(&self) -> Option<&CommandSpec> {
        match &self.action {
            StepAction::Packages { command, .. }
            | StepAction::Tool { command, .. }
            | StepAction::PostInstall { command, .. }
            | StepAction::Verify { command }
            | StepAction::Install { command, .. } => Some(command),
            _ => None,
        }
    }
}

/// A config-file mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConfigStep {
    pub path: String,

    #[serde(flatten)]
    pub action: ConfigAction,

    /// Octal mode applied after writing, e.g. "0644".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Command run after a successful write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_command: Option<CommandSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ConfigAction {
    /// Replace the file.
    Write { content: String },
    /// Append to the file.
    Append { content: String },
    /// Append the line unless it is already present.
    EnsureLine { line: String },
    /// Render `{var}` placeholders, validate, then write.
    Template {
        template: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        inputs: Vec<InputSpec>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        values: BTreeMap<String, serde_json::Value>,
        #[serde(default)]
        format: ConfigFormat,
    },
}

/// Fetch an artifact over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DownloadStep {
    pub url: String,
    pub dest: String,
    /// Declared size in bytes, used for the disk-space pre-flight.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<DownloadAuth>,
    /// Freshness stamp key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_pack_id: Option<String>,
}

/// Credentials for a download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DownloadAuth {
    #[serde(rename = "type")]
    pub kind: AuthKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Environment variable holding the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_env_var: Option<String>,
    /// Header name for `header` auth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_name: Option<String>,
    /// Username for `basic` auth; the token is the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    Bearer,
    Basic,
    Header,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Enable,
    Disable,
    Status,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
            ServiceAction::Enable => "enable",
            ServiceAction::Disable => "disable",
            ServiceAction::Status => "status",
        }
    }
}

/// Install a binary from a GitHub release asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ReleaseStep {
    /// `owner/name`.
    pub repo: String,
    /// Tag to install; latest when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Regex matched against asset names; `{arch}` and `{os}` expand first.
    pub asset_pattern: String,
    /// Binary to locate in the extracted tree; first executable when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}
