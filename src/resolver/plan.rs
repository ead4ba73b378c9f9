//! Plan assembly.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::warn;

use super::apply::{placeholder_values, substitute_all, Builtins};
use super::condition::holds_opt;
use super::deps::Collection;
use crate::profile::{package_install_command, package_manager_needs_sudo, SystemProfile};
use crate::recipe::{ConstraintKind, RecipeBase, ToolRecipe, VersionConstraint};
use crate::risk::{
    aggregate, confirmation_gate, detect_escalation, infer_risk, ConfirmationGate, Escalation,
    RiskLevel, RiskSummary,
};
use crate::steps::{Step, StepAction};

static VERSION_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("VERSION_NUMBER must compile")
});

/// A fully resolved, ordered install plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub tool: String,
    pub label: String,
    /// `tool`, `data_pack` or `config`.
    pub kind: String,
    pub already_installed: bool,
    pub needs_sudo: bool,
    pub risk_summary: RiskSummary,
    pub confirmation_gate: ConfirmationGate,
    pub steps: Vec<Step>,
    /// Install method chosen for the target tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_constraint: Option<ConstraintCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_escalation: Option<Escalation>,
}

impl Plan {
    /// A plan for a tool that is already present.
    pub fn already_installed(tool: &str, base: &RecipeBase, kind: &str) -> Self {
        Self {
            tool: tool.to_string(),
            label: base.label.clone(),
            kind: kind.to_string(),
            already_installed: true,
            needs_sudo: false,
            risk_summary: RiskSummary::default(),
            confirmation_gate: ConfirmationGate::None,
            steps: Vec::new(),
            method: None,
            warning: None,
            version_constraint: None,
            risk_escalation: None,
        }
    }

    /// Tag, summarize and gate `steps`.
    pub fn from_steps(tool: &str, base: &RecipeBase, kind: &str, mut steps: Vec<Step>) -> Self {
        for step in &mut steps {
            step.risk = Some(infer_risk(step));
        }
        let risk_summary = aggregate(&steps);
        let confirmation_gate = confirmation_gate(&steps);
        let risk_escalation = detect_escalation(base.risk, risk_summary.level);
        Self {
            tool: tool.to_string(),
            label: base.label.clone(),
            kind: kind.to_string(),
            already_installed: false,
            needs_sudo: steps.iter().any(|s| s.needs_sudo),
            risk_summary,
            confirmation_gate,
            steps,
            method: None,
            warning: None,
            version_constraint: None,
            risk_escalation,
        }
    }

    /// Indices of steps of a given type.
    pub fn indices_of(&self, kind: &str) -> Vec<usize> {
        self.steps
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind() == kind)
            .map(|(i, _)| i)
            .collect()
    }
}

/// A version constraint as surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstraintCheck {
    #[serde(flatten)]
    pub constraint: VersionConstraint,
    /// Reference version resolved from the recipe or profile.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_version: Option<String>,
    /// Version the plan will install, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_version: Option<String>,
    /// Whether the constraint could be checked.
    pub validated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub satisfied: Option<bool>,
}

fn parse_version(text: &str) -> Option<(u64, u64, u64)> {
    let caps = VERSION_NUMBER.captures(text)?;
    let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
    Some((part(1), part(2), part(3)))
}

/// Whether `candidate` satisfies `constraint` relative to `reference`.
pub fn constraint_satisfied(
    constraint: &VersionConstraint,
    candidate: &str,
    reference: &str,
) -> Option<bool> {
    let c = parse_version(candidate)?;
    let r = parse_version(reference)?;
    let ok = match constraint.kind {
        ConstraintKind::MinorRange => {
            let range = u64::from(constraint.range.unwrap_or(1));
            c.0 == r.0 && c.1.abs_diff(r.1) <= range
        }
        ConstraintKind::MajorMatch => c.0 == r.0,
        ConstraintKind::Gte => c >= r,
        ConstraintKind::Exact => c == r,
    };
    Some(ok)
}

/// Resolve the reference version and check the candidate against it.
pub fn check_constraint(
    constraint: &VersionConstraint,
    profile: &SystemProfile,
    candidate: Option<&str>,
) -> ConstraintCheck {
    let reference = constraint.reference.clone().or_else(|| {
        constraint
            .reference_hint
            .as_ref()
            .and_then(|hint| profile.versions.get(hint).cloned())
    });
    let candidate = candidate.filter(|v| *v != "latest").map(str::to_string);
    let satisfied = match (&candidate, &reference) {
        (Some(c), Some(r)) => constraint_satisfied(constraint, c, r),
        _ => None,
    };
    ConstraintCheck {
        constraint: constraint.clone(),
        validated: satisfied.is_some(),
        reference_version: reference,
        candidate_version: candidate,
        satisfied,
    }
}

/// Inputs to [`assemble`] besides the collection.
pub struct AssemblyInput<'a> {
    pub tool_id: &'a str,
    pub tool: &'a ToolRecipe,
    pub profile: &'a SystemProfile,
    pub builtins: &'a Builtins,
    /// Recipes of every collected tool, for their post-install steps.
    pub recipes: BTreeMap<String, &'a ToolRecipe>,
    pub install_risk: Option<RiskLevel>,
}

/// Assemble the collection into ordered steps: repo setup, one package
/// batch, tool installs, post-install, verify.
pub fn assemble(input: &AssemblyInput<'_>, collection: &Collection) -> (Vec<Step>, Option<String>) {
    let mut steps: Vec<Step> = Vec::new();
    let mut warning = None;
    let primary = input.profile.package_manager.primary.as_str();

    steps.extend(collection.repo_setup.iter().cloned());

    if !collection.batch_packages.is_empty() {
        match package_install_command(primary, &collection.batch_packages) {
            Some(command) => {
                let mut step = Step::new(
                    "Install system packages",
                    StepAction::Packages {
                        package_manager: primary.to_string(),
                        packages: collection.batch_packages.clone(),
                        command,
                    },
                )
                .with_sudo(package_manager_needs_sudo(primary))
                .with_method(primary);
                if collection.batched_tools.iter().any(|t| t == input.tool_id) {
                    step.risk = input.install_risk;
                }
                steps.push(step);
            }
            None => {
                warning = Some(format!(
                    "Cannot install system packages with '{}': {}",
                    primary,
                    collection.batch_packages.join(", ")
                ));
            }
        }
    }

    for tool_step in &collection.tool_steps {
        let owner = tool_step.tool_id.as_deref().unwrap_or(input.tool_id);
        let mut step = tool_step.clone().with_post_env(collection.env_before(owner));
        if owner == input.tool_id && step.risk.is_none() {
            step.risk = input.install_risk;
        }
        steps.push(step);
    }

    for tool_id in &collection.installed {
        let Some(recipe) = input.recipes.get(tool_id) else {
            continue;
        };
        for spec in &recipe.post_install {
            if !holds_opt(spec.condition, input.profile) {
                continue;
            }
            let step = Step::from_spec(
                spec,
                StepAction::PostInstall {
                    command: spec.command.clone(),
                    script_sha256: spec.script_sha256.clone(),
                },
            )
            .with_tool(tool_id.clone())
            .with_post_env(collection.env_all());
            steps.push(step);
        }
    }

    if let Some(verify) = &input.tool.base.verify {
        steps.push(verify_step(input.tool_id, &input.tool.base, verify, collection.env_all()));
    }

    for step in &mut steps {
        if step.method.is_none() {
            let owner = step.tool_id.as_deref().unwrap_or(input.tool_id);
            step.method = collection.method_of(owner).map(str::to_string);
        }
    }

    let values = placeholder_values(&[], &BTreeMap::new(), input.builtins, None);
    let (steps, notes) = substitute_each(steps, &values, |s| s.label.clone());
    let warning = warning
        .into_iter()
        .chain(notes)
        .reduce(|a, b| format!("{}; {}", a, b));
    (steps, warning)
}

/// Substitute placeholders in each item. Items that fail keep their
/// original text and produce a note.
fn substitute_each<T, F>(items: Vec<T>, values: &BTreeMap<String, String>, name: F) -> (Vec<T>, Vec<String>)
where
    T: Serialize + DeserializeOwned,
    F: Fn(&T) -> String,
{
    let mut notes = Vec::new();
    let items = items
        .into_iter()
        .map(|item| match substitute_all(&item, values) {
            Ok(done) => done,
            Err(e) => {
                warn!("Placeholders left in '{}': {}", name(&item), e);
                notes.push(format!("Placeholders left unexpanded in '{}': {}", name(&item), e));
                item
            }
        })
        .collect();
    (items, notes)
}

/// The final verify step of a plan.
pub fn verify_step(tool_id: &str, base: &RecipeBase, command: &[String], env: Option<String>) -> Step {
    Step::new(
        format!("Verify {}", base.label),
        StepAction::Verify {
            command: command.to_vec(),
        },
    )
    .with_tool(tool_id)
    .with_post_env(env)
}
