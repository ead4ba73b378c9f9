//! Undo commands and rollback step generation.
//!
//! [`UNDO_COMMANDS`] maps an install method to the command that reverses
//! it. [`rollback_steps`] walks the completed steps of a plan backwards and
//! produces the steps that undo them; the engine runs those with
//! [`Engine::execute_rollback`](super::Engine::execute_rollback), which never
//! stops early.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::resolver::apply::{placeholders, substitute};
use crate::resolver::Plan;
use crate::steps::{PlanOutcome, ServiceAction, Step, StepAction, StepOutcome};

/// How to reverse one install method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoCommand {
    pub method: &'static str,
    pub template: &'static str,
    pub needs_sudo: bool,
}

const fn undo(method: &'static str, template: &'static str, needs_sudo: bool) -> UndoCommand {
    UndoCommand {
        method,
        template,
        needs_sudo,
    }
}

pub static UNDO_COMMANDS: &[UndoCommand] = &[
    undo("apt", "apt-get remove -y {package}", true),
    undo("dnf", "dnf remove -y {package}", true),
    undo("yum", "yum remove -y {package}", true),
    undo("zypper", "zypper --non-interactive remove {package}", true),
    undo("apk", "apk del {package}", true),
    undo("pacman", "pacman -R --noconfirm {package}", true),
    undo("brew", "brew uninstall {package}", false),
    undo("snap", "snap remove {package}", true),
    undo("flatpak", "flatpak uninstall -y {package}", false),
    undo("pip", "pip3 uninstall -y {package}", false),
    undo("pipx", "pipx uninstall {package}", false),
    undo("cargo", "cargo uninstall {package}", false),
    undo("npm", "npm uninstall -g {package}", false),
    undo("go", "rm -f {binary_path}", false),
    undo("binary", "rm -f {binary_path}", true),
    undo("source", "rm -rf {install_path}", true),
    undo("service", "systemctl disable --now {service}", true),
];

/// Values for undo placeholders. `packages` expands to one argument each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UndoTarget {
    pub packages: Vec<String>,
    pub binary_path: Option<String>,
    pub install_path: Option<String>,
    pub service: Option<String>,
}

impl UndoTarget {
    pub fn package(name: impl Into<String>) -> Self {
        Self {
            packages: vec![name.into()],
            ..Default::default()
        }
    }

    pub fn binary(path: impl Into<String>) -> Self {
        Self {
            binary_path: Some(path.into()),
            ..Default::default()
        }
    }
}

/// Look up a method's undo entry.
pub fn undo_entry(method: &str) -> Option<&'static UndoCommand> {
    UNDO_COMMANDS.iter().find(|u| u.method == method)
}

/// The argv reversing `method` for `target`, and whether it needs root.
///
/// `None` when the method has no undo entry or a placeholder it uses has no
/// value.
pub fn undo_command(method: &str, target: &UndoTarget) -> Option<(Vec<String>, bool)> {
    let entry = undo_entry(method)?;
    let mut values = BTreeMap::new();
    for (key, value) in [
        ("binary_path", &target.binary_path),
        ("install_path", &target.install_path),
        ("service", &target.service),
    ] {
        if let Some(v) = value {
            values.insert(key.to_string(), v.clone());
        }
    }

    let mut argv = Vec::new();
    for token in entry.template.split_whitespace() {
        if token == "{package}" {
            if target.packages.is_empty() {
                return None;
            }
            argv.extend(target.packages.iter().cloned());
            continue;
        }
        let rendered = substitute(token, &values);
        if !placeholders(&rendered).is_empty() {
            return None;
        }
        argv.push(rendered);
    }
    Some((argv, entry.needs_sudo))
}

/// Method implied by the program an install command runs.
fn method_of_program(program: &str) -> Option<&'static str> {
    let method = match program {
        "apt-get" | "apt" => "apt",
        "dnf" => "dnf",
        "yum" => "yum",
        "zypper" => "zypper",
        "apk" => "apk",
        "pacman" => "pacman",
        "brew" => "brew",
        "snap" => "snap",
        "flatpak" => "flatpak",
        "pip" | "pip3" => "pip",
        "pipx" => "pipx",
        "cargo" => "cargo",
        "npm" => "npm",
        _ => return None,
    };
    Some(method)
}

/// First positional argument after the subcommand (`cargo install X` → X).
fn package_argument(command: &[String]) -> Option<String> {
    command
        .iter()
        .skip(2)
        .find(|a| !a.starts_with('-'))
        .cloned()
}

fn restore_or_delete(label: &str, path: &str, outcome: &StepOutcome, needs_sudo: bool) -> Step {
    let command = match &outcome.backup {
        Some(backup) => vec!["mv".to_string(), backup.display().to_string(), path.to_string()],
        None => vec!["rm".to_string(), "-f".to_string(), path.to_string()],
    };
    tool_step(label, command, needs_sudo)
}

fn tool_step(label: &str, command: Vec<String>, needs_sudo: bool) -> Step {
    Step::new(
        format!("Undo: {}", label),
        StepAction::Tool {
            command,
            script_sha256: None,
            cwd: None,
        },
    )
    .with_sudo(needs_sudo)
}

fn from_undo(label: &str, method: &str, target: &UndoTarget) -> Option<Step> {
    let (command, needs_sudo) = undo_command(method, target)?;
    Some(tool_step(label, command, needs_sudo))
}

/// The step undoing `step`, given what running it produced.
pub fn undo_step(plan: &Plan, step: &Step, outcome: &StepOutcome) -> Option<Step> {
    let label = step.label.as_str();
    match &step.action {
        StepAction::Packages {
            package_manager,
            packages,
            ..
        } => from_undo(
            label,
            package_manager,
            &UndoTarget {
                packages: packages.clone(),
                ..Default::default()
            },
        ),
        StepAction::Tool { command, .. } => {
            let owner = step.tool_id.as_deref().unwrap_or(&plan.tool);
            let method = step
                .method
                .as_deref()
                .or_else(|| plan.method.as_deref().filter(|_| owner == plan.tool))
                .or_else(|| command.first().and_then(|p| method_of_program(p)))?;
            let package = package_argument(command).unwrap_or_else(|| owner.to_string());
            let target = UndoTarget {
                packages: vec![package],
                binary_path: outcome.path.as_ref().map(|p| p.display().to_string()),
                ..Default::default()
            };
            from_undo(label, method, &target)
        }
        StepAction::GithubRelease(_) => {
            let path = outcome.path.as_ref()?;
            from_undo(label, "binary", &UndoTarget::binary(path.display().to_string()))
        }
        StepAction::Download(download) => {
            from_undo(label, "binary", &UndoTarget::binary(download.dest.clone()))
                .map(|s| s.with_sudo(step.needs_sudo))
        }
        StepAction::Service { service, action } => match action {
            ServiceAction::Enable | ServiceAction::Start => from_undo(
                label,
                "service",
                &UndoTarget {
                    service: Some(service.clone()),
                    ..Default::default()
                },
            ),
            _ => None,
        },
        StepAction::Config(config) => Some(restore_or_delete(label, &config.path, outcome, step.needs_sudo)),
        StepAction::ShellConfig { .. } => {
            let path: PathBuf = outcome.path.clone()?;
            Some(restore_or_delete(label, &path.display().to_string(), outcome, false))
        }
        StepAction::Install { cwd, .. } if plan.method.as_deref() == Some("source") => {
            let dir = cwd.as_ref()?;
            from_undo(
                label,
                "source",
                &UndoTarget {
                    install_path: Some(dir.clone()),
                    ..Default::default()
                },
            )
        }
        _ => None,
    }
}

/// Undo steps for everything a plan run changed, newest first.
///
/// Skipped and failed steps changed nothing and get no undo step.
pub fn rollback_steps(plan: &Plan, run: &PlanOutcome) -> Vec<Step> {
    plan.steps
        .iter()
        .zip(&run.steps)
        .filter(|(_, outcome)| outcome.ok && !outcome.skipped)
        .filter_map(|(step, outcome)| undo_step(plan, step, outcome))
        .rev()
        .collect()
}
