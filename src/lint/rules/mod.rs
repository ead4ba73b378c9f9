//! Built-in lint rules.
//!
//! This module contains the validation rules every catalog recipe must
//! pass, along with the closed vocabularies they check against.

pub mod catalog;
pub mod choices;
pub mod fields;
pub mod methods;
pub mod on_failure;
pub mod source_spec;

pub use catalog::{CircularDependencyRule, UndefinedDependencyRule};
pub use choices::ChoicesRule;
pub use fields::{FieldTypesRule, RecipeTypeRule, RequiredFieldsRule, UnknownFieldsRule};
pub use methods::{InstallMethodsRule, NeedsSudoCoverageRule, PreferRule};
pub use on_failure::OnFailureRule;
pub use source_spec::SourceSpecRule;

/// Install method keys a recipe may use.
pub const INSTALL_METHODS: &[&str] = &[
    "apt", "dnf", "yum", "zypper", "apk", "pacman", "brew", "snap", "flatpak", "pip", "pipx",
    "npm", "cargo", "go", "source", "_default",
];

/// Install methods that are system package managers.
pub const PACKAGE_MANAGERS: &[&str] = &["apt", "dnf", "yum", "zypper", "apk", "pacman", "brew"];

/// Distro families `packages` and `repo_setup` may be keyed by.
pub const OS_FAMILIES: &[&str] = &["debian", "rhel", "alpine", "arch", "suse", "macos"];

pub const RISK_LEVELS: &[&str] = &["low", "medium", "high", "critical"];

pub const RESTART_SCOPES: &[&str] = &["shell", "session", "service", "system"];

/// Fields of a recipe-declared command step.
pub const COMMAND_STEP_FIELDS: &[&str] = &[
    "label",
    "command",
    "needs_sudo",
    "condition",
    "timeout",
    "risk",
    "script_sha256",
    "restart_required",
    "risk_description",
    "rollback_hint",
    "backup_before",
];
