//! Recipe schema definitions.
//!
//! This module contains the typed form of the YAML recipe catalog. A recipe
//! is one of three kinds sharing a common base; the raw document is checked
//! by [`crate::lint`] before it is converted into these types.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::risk::RiskLevel;
use crate::steps::Step;

/// An argv-style command.
pub type CommandSpec = Vec<String>;

/// Method-keyed command map (`apt`, `brew`, `_default`, ...).
pub type MethodCommands = BTreeMap<String, CommandSpec>;

/// A recipe: tool, data pack, or config file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Recipe {
    Tool(ToolRecipe),
    DataPack(DataPackRecipe),
    Config(ConfigRecipe),
}

impl Recipe {
    /// Fields shared by every kind.
    pub fn base(&self) -> &RecipeBase {
        match self {
            Recipe::Tool(r) => &r.base,
            Recipe::DataPack(r) => &r.base,
            Recipe::Config(r) => &r.base,
        }
    }

    /// Kind name as written in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Recipe::Tool(_) => "tool",
            Recipe::DataPack(_) => "data_pack",
            Recipe::Config(_) => "config",
        }
    }

    pub fn as_tool(&self) -> Option<&ToolRecipe> {
        match self {
            Recipe::Tool(r) => Some(r),
            _ => None,
        }
    }

    /// Convert a raw (already validated) document, inferring `type` when
    /// it is not given explicitly.
    pub fn from_value(mut value: serde_json::Value) -> serde_json::Result<Self> {
        if let Some(obj) = value.as_object_mut() {
            if !obj.contains_key("type") {
                if let Some(kind) = infer_kind(obj) {
                    obj.insert("type".into(), serde_json::Value::String(kind.into()));
                }
            }
        }
        serde_json::from_value(value)
    }
}

/// Infer a recipe kind from which shape-defining field is present.
pub fn infer_kind(obj: &serde_json::Map<String, serde_json::Value>) -> Option<&'static str> {
    if let Some(explicit) = obj.get("type").and_then(|t| t.as_str()) {
        return match explicit {
            "tool" => Some("tool"),
            "data_pack" => Some("data_pack"),
            "config" => Some("config"),
            _ => None,
        };
    }
    if obj.contains_key("install") {
        Some("tool")
    } else if obj.contains_key("steps") {
        Some("data_pack")
    } else if obj.contains_key("config_templates") {
        Some("config")
    } else {
        None
    }
}

/// Fields common to all recipe kinds.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RecipeBase {
    /// Display name.
    pub label: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Author-declared baseline risk.
    #[serde(default)]
    pub risk: RiskLevel,

    /// Binary probed to decide whether the tool is already installed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cli: Option<String>,

    /// Command proving the install works.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<CommandSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub update: MethodCommands,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub rollback: MethodCommands,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub remove: MethodCommands,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_required: Option<RestartScope>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_constraint: Option<VersionConstraint>,
}

/// What must be restarted after a change takes effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RestartScope {
    Shell,
    Session,
    Service,
    System,
}

/// A tool installed through one of several methods.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ToolRecipe {
    #[serde(flatten)]
    pub base: RecipeBase,

    /// Method key → install command, or a build spec under `source`.
    #[serde(default)]
    pub install: BTreeMap<String, InstallSpec>,

    /// Method key → whether it needs root. `_default` covers the rest.
    #[serde(default)]
    pub needs_sudo: BTreeMap<String, bool>,

    #[serde(default)]
    pub requires: Requires,

    /// Ordered method preference.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefer: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<ChoiceSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_choice: Option<VersionChoiceSpec>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputSpec>,

    /// Choice answer → install branch.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub install_variants: BTreeMap<String, InstallVariant>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_install: Vec<CommandStepSpec>,

    /// Shell snippet later steps need to see this tool (e.g. a PATH export).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_env: Option<String>,

    /// Distro family → repository bootstrap steps.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub repo_setup: BTreeMap<String, Vec<CommandStepSpec>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_failure: Vec<FailureHandler>,
}

impl ToolRecipe {
    /// Whether `method` needs sudo, falling back to `_default`.
    pub fn method_needs_sudo(&self, method: &str) -> bool {
        self.needs_sudo
            .get(method)
            .or_else(|| self.needs_sudo.get("_default"))
            .copied()
            .unwrap_or(false)
    }

    /// The install command for a method, if it is a plain command.
    pub fn install_command(&self, method: &str) -> Option<&CommandSpec> {
        match self.install.get(method)? {
            InstallSpec::Command(cmd) => Some(cmd),
            InstallSpec::Source(_) => None,
        }
    }

    /// The build spec, if the recipe supports building from source.
    pub fn source_spec(&self) -> Option<&SourceSpec> {
        match self.install.get("source")? {
            InstallSpec::Source(spec) => Some(spec),
            InstallSpec::Command(_) => None,
        }
    }
}

/// An install entry: a command, or a structured build-from-source spec.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum InstallSpec {
    Command(CommandSpec),
    Source(SourceSpec),
}

/// Build-from-source description.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SourceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
    /// Tarball URL, may contain `{version}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tarball_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_version: Option<String>,
    pub build_system: BuildSystem,
    /// Toolchain binaries that must exist before building.
    #[serde(default)]
    pub requires_toolchain: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub configure_args: Vec<String>,
    /// Commands for `build_system: custom`, run in the source directory.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub build_commands: Vec<CommandSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BuildSystem {
    #[default]
    Autotools,
    Cmake,
    Make,
    Cargo,
    Meson,
    Go,
    Custom,
}

/// Dependencies of a tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Requires {
    /// Tool ids (recipes) that must be installed first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binaries: Vec<String>,
    /// Distro family → system package names.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub packages: BTreeMap<String, Vec<String>>,
}

/// A command-running step declared inside a recipe (post-install, repo
/// bootstrap, variant sequence).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CommandStepSpec {
    pub label: String,
    pub command: CommandSpec,
    #[serde(default)]
    pub needs_sudo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_required: Option<RestartScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub backup_before: Vec<String>,
}

/// Profile predicates recipes may gate steps and remediation options on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    HasSystemd,
    HasOpenrc,
    IsLinux,
    NotContainer,
    WritableRootfs,
    NotRoot,
    HasSudo,
}

impl Condition {
    /// Every accepted condition name.
    pub const NAMES: &'static [&'static str] = &[
        "has_systemd",
        "has_openrc",
        "is_linux",
        "not_container",
        "writable_rootfs",
        "not_root",
        "has_sudo",
    ];
}

/// A user decision point.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ChoiceSpec {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub options: Vec<OptionSpec>,
}

/// One option of a choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct OptionSpec {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub requires: OptionRequires,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Shown when the option is unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_hint: Option<String>,
}

/// Constraints gating an option.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct OptionRequires {
    /// URLs that must be reachable.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network: Vec<String>,
    /// Distro families (or "linux"/"darwin") the option supports.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub binaries: Vec<String>,
    /// Dotted profile key → expected bool/number, or ">=N" string.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hardware: BTreeMap<String, serde_json::Value>,
}

impl OptionRequires {
    pub fn is_empty(&self) -> bool {
        self.network.is_empty()
            && self.platforms.is_empty()
            && self.binaries.is_empty()
            && self.hardware.is_empty()
    }
}

/// Where version options come from.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum VersionChoiceSpec {
    /// Author-supplied list.
    Static {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        options: Vec<VersionOption>,
    },
    /// Whatever the package manager ships.
    PackageManager {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    /// Live fetch of GitHub releases.
    Dynamic {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        github_repo: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_versions: Option<usize>,
        #[serde(default)]
        include_prerelease: bool,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct VersionOption {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub default: bool,
}

/// A free-form value supplied by the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InputSpec {
    pub id: String,
    pub label: String,
    #[serde(rename = "type", default)]
    pub kind: InputKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Allowed values for `select`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Regex a text value must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<InputCondition>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    #[default]
    Text,
    Number,
    Bool,
    Select,
    Path,
    Secret,
}

/// When an input applies.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InputCondition {
    /// Choice id whose answer is compared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_equals: Option<String>,
    /// Profile condition that must hold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Condition>,
}

/// The install branch selected by a choice answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct InstallVariant {
    /// Replaces the install map with a single `_default` command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<CommandSpec>,
    /// A direct step sequence that bypasses the install map.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<CommandStepSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_sudo: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify: Option<CommandSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_install: Option<Vec<CommandStepSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<Requires>,
}

/// Matches a failure's stderr and offers remediations.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FailureHandler {
    pub pattern: String,
    pub category: FailureCategory,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub options: Vec<RemediationSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Environment,
    Dependency,
    Permissions,
    Network,
    Disk,
    Resources,
    Compiler,
    PackageManager,
    Configuration,
    Install,
}

impl FailureCategory {
    pub const NAMES: &'static [&'static str] = &[
        "environment",
        "dependency",
        "permissions",
        "network",
        "disk",
        "resources",
        "compiler",
        "package_manager",
        "configuration",
        "install",
    ];
}

/// One remediation option of a failure handler.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RemediationSpec {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub risk: RiskLevel,
    #[serde(default)]
    pub recommended: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Condition>,
    #[serde(flatten)]
    pub strategy: Strategy,
}

/// How a remediation fixes the failure.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Strategy {
    InstallDep {
        dep: String,
    },
    InstallDepThenSwitch {
        dep: String,
        switch_to: String,
    },
    InstallPackages {
        packages: BTreeMap<String, Vec<String>>,
    },
    SwitchMethod {
        method: String,
    },
    RetryWithModifier {
        modifier: BTreeMap<String, serde_json::Value>,
    },
    AddRepo {
        repo_commands: Vec<CommandSpec>,
    },
    UpgradeDep {
        dep: String,
    },
    EnvFix {
        fix_commands: Vec<CommandSpec>,
    },
    Manual {
        instructions: String,
    },
    CleanupRetry {
        cleanup_commands: Vec<CommandSpec>,
    },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::InstallDep { .. } => "install_dep",
            Strategy::InstallDepThenSwitch { .. } => "install_dep_then_switch",
            Strategy::InstallPackages { .. } => "install_packages",
            Strategy::SwitchMethod { .. } => "switch_method",
            Strategy::RetryWithModifier { .. } => "retry_with_modifier",
            Strategy::AddRepo { .. } => "add_repo",
            Strategy::UpgradeDep { .. } => "upgrade_dep",
            Strategy::EnvFix { .. } => "env_fix",
            Strategy::Manual { .. } => "manual",
            Strategy::CleanupRetry { .. } => "cleanup_retry",
        }
    }
}

/// A pre-built data download (models, datasets, signature databases).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct DataPackRecipe {
    #[serde(flatten)]
    pub base: RecipeBase,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputSpec>,
    /// How long a download stays fresh.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness_days: Option<u32>,
}

/// A rendered configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ConfigRecipe {
    #[serde(flatten)]
    pub base: RecipeBase,
    pub config_templates: Vec<ConfigTemplate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConfigTemplate {
    pub id: String,
    pub file: String,
    pub template: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub format: ConfigFormat,
    #[serde(default)]
    pub needs_sudo: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Command run after a successful write (e.g. a service reload).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_command: Option<CommandSpec>,
}

/// Declared shape of a rendered config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfigFormat {
    #[default]
    Raw,
    Json,
    Yaml,
    Ini,
    Env,
}

/// A version relationship the installed tool must keep with a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VersionConstraint {
    #[serde(rename = "type")]
    pub kind: ConstraintKind,
    /// Explicit reference version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Key into the profile's detected versions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_hint: Option<String>,
    /// Allowed minor distance for `minor_range`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    MinorRange,
    MajorMatch,
    Gte,
    Exact,
}
