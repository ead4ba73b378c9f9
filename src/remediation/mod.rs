//! Remediation bridge.
//!
//! When a plan step fails, the engine hands a [`FailureContext`] to a
//! [`RemediationService`] and relays the options it returns alongside the
//! failure. [`RecipeHandlers`] is the built-in service: it matches the
//! failing tool's own `on_failure` handlers.

pub mod handlers;
pub mod infer;

pub use handlers::RecipeHandlers;
pub use infer::infer_method;

use serde::Serialize;

use crate::profile::SystemProfile;
use crate::risk::RiskLevel;

/// Everything known about a failed step.
#[derive(Debug, Clone, Serialize)]
pub struct FailureContext {
    pub tool: String,
    pub step_index: usize,
    pub step_label: String,
    pub exit_code: Option<i32>,
    pub stderr: String,
    /// Install method the plan used, when known.
    pub method: Option<String>,
    pub profile: SystemProfile,
}

impl FailureContext {
    /// The plan's method, or one sniffed from stderr.
    pub fn effective_method(&self) -> Option<String> {
        self.method.clone().or_else(|| infer_method(&self.stderr))
    }
}

/// One way to recover from a failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemediationOption {
    pub id: String,
    pub label: String,
    /// Strategy name, e.g. `install_packages` or `switch_method`.
    pub strategy: String,
    pub risk: RiskLevel,
    pub recommended: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Label of the handler that produced this option.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
}

/// Produces remediation options for a failure.
pub trait RemediationService {
    fn remediate(&self, ctx: &FailureContext) -> Vec<RemediationOption>;
}
