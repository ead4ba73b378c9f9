//! Update and remove command implementations.

use std::io::Write;
use std::path::PathBuf;

use crate::cli::args::LifecycleArgs;
use crate::engine::{Engine, LifecycleAction};
use crate::error::Result;

use super::dispatcher::{Command, CommandResult, EXIT_FAILURE};
use super::display::{load_catalog, load_profile, write_json};

/// Runs `rigup update` or `rigup remove` for one tool.
pub struct LifecycleCommand {
    catalog: Option<PathBuf>,
    action: LifecycleAction,
    args: LifecycleArgs,
}

impl LifecycleCommand {
    pub fn new(catalog: Option<PathBuf>, action: LifecycleAction, args: LifecycleArgs) -> Self {
        Self {
            catalog,
            action,
            args,
        }
    }
}

impl Command for LifecycleCommand {
    fn execute(&self, out: &mut dyn Write) -> Result<CommandResult> {
        let catalog = load_catalog(self.catalog.as_deref())?;
        let profile = load_profile(&self.args.target.profile)?;
        let engine = Engine::new(profile);
        let tool = &self.args.target.tool;
        let sudo = self.args.sudo_password.as_deref();

        let result = match self.action {
            LifecycleAction::Update => engine.update_tool(&catalog, tool, sudo),
            LifecycleAction::Remove => engine.remove_tool(&catalog, tool, sudo),
        };
        match result {
            Ok(outcome) => {
                write_json(out, &outcome)?;
                if outcome.ok {
                    Ok(CommandResult::success())
                } else {
                    Ok(CommandResult::failure(EXIT_FAILURE))
                }
            }
            Err(e) => {
                write_json(out, &e)?;
                Ok(CommandResult::failure(EXIT_FAILURE))
            }
        }
    }
}
