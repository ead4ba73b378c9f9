//! Run command implementation.
//!
//! The `rigup run` command resolves a plan, checks that its confirmation
//! gate was acknowledged on the command line, executes it and optionally
//! rolls back completed steps when a step fails.

use serde::Serialize;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::args::RunArgs;
use crate::engine::{rollback_steps, Engine};
use crate::error::Result;
use crate::remediation::RecipeHandlers;
use crate::resolver::{Plan, Resolver};
use crate::risk::ConfirmationGate;
use crate::steps::{PlanOutcome, RollbackReport};

use super::dispatcher::{Command, CommandResult, EXIT_FAILURE, EXIT_NOT_CONFIRMED};
use super::display::{answers, gate_summary, load_catalog, load_profile, write_json};
use super::plan::resolve;

/// Everything `rigup run` reports.
#[derive(Debug, Serialize)]
struct RunReport<'a> {
    plan: &'a Plan,
    outcome: PlanOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    rollback: Option<RollbackReport>,
}

/// The run command implementation.
pub struct RunCommand {
    catalog: Option<PathBuf>,
    args: RunArgs,
}

impl RunCommand {
    /// Create a new run command.
    pub fn new(catalog: Option<PathBuf>, args: RunArgs) -> Self {
        Self { catalog, args }
    }

    /// Get the command arguments.
    pub fn args(&self) -> &RunArgs {
        &self.args
    }

    /// Whether the flags given satisfy the gate.
    fn acknowledged(&self, gate: &ConfirmationGate) -> bool {
        match gate {
            ConfirmationGate::None => true,
            ConfirmationGate::Single { .. } => self.args.yes,
            ConfirmationGate::Double { .. } => self.args.yes && self.args.i_understand,
        }
    }
}

impl Command for RunCommand {
    fn execute(&self, out: &mut dyn Write) -> Result<CommandResult> {
        let catalog = Arc::new(load_catalog(self.catalog.as_deref())?);
        let profile = load_profile(&self.args.target.profile)?;
        let resolver = Resolver::new(Arc::clone(&catalog));

        let plan = match resolve(&resolver, &self.args.target.tool, &profile, &answers(&self.args.answers)) {
            Ok(plan) => plan,
            Err(e) => {
                write_json(out, &e)?;
                return Ok(CommandResult::failure(EXIT_FAILURE));
            }
        };

        if !self.acknowledged(&plan.confirmation_gate) {
            let flags = match plan.confirmation_gate {
                ConfirmationGate::Double { .. } => "--yes --i-understand",
                _ => "--yes",
            };
            write_json(
                out,
                &json!({
                    "tool": plan.tool,
                    "confirmation_gate": plan.confirmation_gate,
                    "message": format!("{}; pass {} to proceed", gate_summary(&plan.confirmation_gate), flags),
                }),
            )?;
            return Ok(CommandResult::failure(EXIT_NOT_CONFIRMED));
        }

        let engine = Engine::new(profile).with_remediation(Box::new(RecipeHandlers::new(catalog)));
        let sudo = self.args.sudo_password.as_deref();
        info!("Running {} step(s) for {}", plan.steps.len(), plan.tool);
        let outcome = engine.execute_plan(&plan, sudo);

        let rollback = if !outcome.ok && self.args.rollback {
            let steps = rollback_steps(&plan, &outcome);
            warn!("Rolling back {} step(s) for {}", steps.len(), plan.tool);
            Some(engine.execute_rollback(&steps, sudo))
        } else {
            None
        };

        let ok = outcome.ok;
        write_json(
            out,
            &RunReport {
                plan: &plan,
                outcome,
                rollback,
            },
        )?;
        if ok {
            Ok(CommandResult::success())
        } else {
            Ok(CommandResult::failure(EXIT_FAILURE))
        }
    }
}
