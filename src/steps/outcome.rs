//! Step execution results.

use serde::Serialize;
use std::path::PathBuf;

use crate::remediation::RemediationOption;
use crate::shell::CommandResult;

/// Result of executing one step.
///
/// Failures are data: `ok == false` with `error` set. Nothing here is
/// raised to the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepOutcome {
    pub ok: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,

    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,

    /// Nothing needed doing.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,

    /// The binary is installed but only visible to a new shell.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub needs_shell_restart: bool,

    /// Service activity for `status`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,

    /// File written or binary installed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<PathBuf>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl StepOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            skipped: true,
            ..Self::ok(message)
        }
    }

    /// Map a finished command onto an outcome.
    pub fn from_command(result: &CommandResult, success_message: impl Into<String>) -> Self {
        let mut outcome = if result.success {
            Self::ok(success_message)
        } else {
            Self::fail(result.error_message())
        };
        outcome.exit_code = result.exit_code;
        outcome.stdout = result.stdout.clone();
        outcome.stderr = result.stderr.clone();
        outcome
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }
}

/// Aggregate result of a best-effort rollback.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RollbackReport {
    /// True only when every rollback step succeeded.
    pub ok: bool,
    pub steps_run: usize,
    pub steps_failed: usize,
    pub errors: Vec<String>,
}

/// Result of running a whole plan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanOutcome {
    pub tool: String,
    pub ok: bool,
    /// Outcomes of the steps that ran, in order.
    pub steps: Vec<StepOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remediation: Vec<RemediationOption>,
}
