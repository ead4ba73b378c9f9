//! Risk classification and confirmation gates.
//!
//! Pure functions: a step's risk is inferred from what it declares, a plan's
//! risk is the maximum of its steps, and the confirmation gate a caller must
//! show follows from that.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::recipe::RestartScope;
use crate::steps::Step;

/// Danger level, totally ordered low < medium < high < critical.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Label words that mark a step as touching the boot path or kernel.
const HIGH_RISK_KEYWORDS: &[&str] = &["kernel", "driver", "grub", "dkms", "vfio", "modprobe", "nvidia"];

/// Classify a single step.
pub fn infer_risk(step: &Step) -> RiskLevel {
    if let Some(risk) = step.risk {
        return risk;
    }
    if step.restart_required == Some(RestartScope::System) {
        return RiskLevel::High;
    }
    let label = step.label.to_lowercase();
    if HIGH_RISK_KEYWORDS.iter().any(|k| label.contains(k)) {
        return RiskLevel::High;
    }
    if step.needs_sudo {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Per-level step counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub critical: usize,
}

/// Aggregate risk of a step list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub level: RiskLevel,
    pub counts: RiskCounts,
    pub has_high: bool,
    pub has_medium: bool,
}

/// Summarize the risk of `steps`; the level is the maximum present.
pub fn aggregate(steps: &[Step]) -> RiskSummary {
    let mut summary = RiskSummary::default();
    for step in steps {
        let risk = infer_risk(step);
        match risk {
            RiskLevel::Low => summary.counts.low += 1,
            RiskLevel::Medium => summary.counts.medium += 1,
            RiskLevel::High => summary.counts.high += 1,
            RiskLevel::Critical => summary.counts.critical += 1,
        }
        summary.level = summary.level.max(risk);
    }
    summary.has_high = summary.level >= RiskLevel::High;
    summary.has_medium = summary.counts.medium > 0;
    summary
}

/// The resolved plan is riskier than the recipe declares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escalation {
    pub from: RiskLevel,
    pub to: RiskLevel,
    pub reason: String,
}

/// Report an escalation only when `resolved` is strictly higher.
pub fn detect_escalation(declared: RiskLevel, resolved: RiskLevel) -> Option<Escalation> {
    (resolved > declared).then(|| Escalation {
        from: declared,
        to: resolved,
        reason: format!(
            "Your selections raise this install from {} to {} risk",
            declared, resolved
        ),
    })
}

/// Phrase a caller must collect before running a double-gated plan.
pub const ACKNOWLEDGMENT: &str = "I understand";

/// A high-risk step as shown in a double confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighRiskStep {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_hint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub backup_targets: Vec<String>,
}

/// How much acknowledgment the caller must collect before execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "level", rename_all = "snake_case")]
pub enum ConfirmationGate {
    None,
    Single {
        reason: String,
    },
    Double {
        reason: String,
        high_risk_steps: Vec<HighRiskStep>,
        acknowledgment: String,
    },
}

impl ConfirmationGate {
    pub fn level(&self) -> &'static str {
        match self {
            ConfirmationGate::None => "none",
            ConfirmationGate::Single { .. } => "single",
            ConfirmationGate::Double { .. } => "double",
        }
    }
}

/// Derive the gate for an assembled step list.
pub fn confirmation_gate(steps: &[Step]) -> ConfirmationGate {
    let high: Vec<HighRiskStep> = steps
        .iter()
        .filter(|s| infer_risk(s) >= RiskLevel::High)
        .map(|s| HighRiskStep {
            label: s.label.clone(),
            risk_description: s.risk_description.clone(),
            rollback_hint: s.rollback_hint.clone(),
            backup_targets: s.backup_before.clone(),
        })
        .collect();

    if !high.is_empty() {
        return ConfirmationGate::Double {
            reason: format!(
                "{} high-risk step(s) may affect system stability",
                high.len()
            ),
            high_risk_steps: high,
            acknowledgment: ACKNOWLEDGMENT.to_string(),
        };
    }

    let sudo_steps = steps.iter().filter(|s| s.needs_sudo).count();
    let risky = steps.iter().any(|s| infer_risk(s) > RiskLevel::Low);
    if sudo_steps > 0 || risky {
        ConfirmationGate::Single {
            reason: format!("{} step(s) require administrator privileges", sudo_steps),
        }
    } else {
        ConfirmationGate::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{Step, StepAction};

    fn step(label: &str, sudo: bool) -> Step {
        Step::new(
            label,
            StepAction::Notification {
                message: String::new(),
            },
        )
        .with_sudo(sudo)
    }

    #[test]
    fn explicit_risk_wins() {
        let mut s = step("Install kernel headers", true);
        s.risk = Some(RiskLevel::Low);
        assert_eq!(infer_risk(&s), RiskLevel::Low);
    }

    #[test]
    fn system_restart_is_high() {
        let mut s = step("Apply settings", false);
        s.restart_required = Some(RestartScope::System);
        assert_eq!(infer_risk(&s), RiskLevel::High);
    }

    #[test]
    fn keyword_in_label_is_high() {
        assert_eq!(infer_risk(&step("Load VFIO modules", false)), RiskLevel::High);
        assert_eq!(infer_risk(&step("Update GRUB", true)), RiskLevel::High);
    }

    #[test]
    fn sudo_is_medium_else_low() {
        assert_eq!(infer_risk(&step("Install packages", true)), RiskLevel::Medium);
        assert_eq!(infer_risk(&step("Print notice", false)), RiskLevel::Low);
    }

    #[test]
    fn aggregate_takes_maximum() {
        let steps = vec![step("a", false), step("b", true), step("c", false)];
        let summary = aggregate(&steps);
        assert_eq!(summary.level, RiskLevel::Medium);
        assert_eq!(summary.counts.low, 2);
        assert!(summary.has_medium);
        assert!(!summary.has_high);
    }

    #[test]
    fn aggregate_is_monotonic_under_high_step() {
        let lists = vec![
            vec![],
            vec![step("a", false)],
            vec![step("a", true), step("b", false)],
        ];
        for mut steps in lists {
            steps.push(step("Install nvidia driver", true));
            let summary = aggregate(&steps);
            assert!(summary.level >= RiskLevel::High);
            assert!(summary.has_high);
        }
    }

    #[test]
    fn escalation_only_when_strictly_higher() {
        assert!(detect_escalation(RiskLevel::Low, RiskLevel::Low).is_none());
        assert!(detect_escalation(RiskLevel::High, RiskLevel::Medium).is_none());
        let esc = detect_escalation(RiskLevel::Low, RiskLevel::High).unwrap();
        assert_eq!(esc.from, RiskLevel::Low);
        assert_eq!(esc.to, RiskLevel::High);
    }

    #[test]
    fn gate_none_single_double() {
        assert_eq!(confirmation_gate(&[step("a", false)]), ConfirmationGate::None);
        assert_eq!(confirmation_gate(&[step("a", true)]).level(), "single");

        let mut driver = step("Install nvidia driver", true);
        driver.rollback_hint = Some("apt-get remove nvidia-driver".into());
        driver.backup_before = vec!["/etc/modprobe.d".into()];
        match confirmation_gate(&[step("a", true), driver]) {
            ConfirmationGate::Double {
                high_risk_steps,
                acknowledgment,
                ..
            } => {
                assert_eq!(high_risk_steps.len(), 1);
                assert_eq!(high_risk_steps[0].backup_targets, vec!["/etc/modprobe.d"]);
                assert_eq!(acknowledgment, ACKNOWLEDGMENT);
            }
            other => panic!("expected double gate, got {:?}", other),
        }
    }

    #[test]
    fn gate_serializes_level_tag() {
        let json = serde_json::to_value(ConfirmationGate::None).unwrap();
        assert_eq!(json["level"], "none");
    }
}
