//! Plan command implementation.
//!
//! The `rigup plan` command resolves an install plan for a recipe against a
//! profile and prints it as JSON without running anything.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::args::PlanArgs;
use crate::error::{ResolutionError, Result};
use crate::profile::SystemProfile;
use crate::resolver::{Answers, Plan, Resolver};

use super::dispatcher::{Command, CommandResult, EXIT_FAILURE};
use super::display::{answers, load_catalog, load_profile, write_json};

/// The plan command implementation.
pub struct PlanCommand {
    catalog: Option<PathBuf>,
    args: PlanArgs,
}

impl PlanCommand {
    /// Create a new plan command.
    pub fn new(catalog: Option<PathBuf>, args: PlanArgs) -> Self {
        Self { catalog, args }
    }
}

/// Resolve with defaults, or with answers when any were given.
pub(crate) fn resolve(
    resolver: &Resolver,
    tool: &str,
    profile: &SystemProfile,
    answers: &Answers,
) -> std::result::Result<Plan, ResolutionError> {
    if answers.is_empty() {
        resolver.resolve_install_plan(tool, profile)
    } else {
        resolver.resolve_install_plan_with_choices(tool, profile, answers)
    }
}

impl Command for PlanCommand {
    fn execute(&self, out: &mut dyn Write) -> Result<CommandResult> {
        let catalog = Arc::new(load_catalog(self.catalog.as_deref())?);
        let profile = load_profile(&self.args.target.profile)?;
        let resolver = Resolver::new(catalog);

        match resolve(&resolver, &self.args.target.tool, &profile, &answers(&self.args.answers)) {
            Ok(plan) => {
                write_json(out, &plan)?;
                Ok(CommandResult::success())
            }
            Err(e) => {
                write_json(out, &e)?;
                Ok(CommandResult::failure(EXIT_FAILURE))
            }
        }
    }
}
