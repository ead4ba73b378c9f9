//! Choices command implementation.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::args::ToolArgs;
use crate::error::Result;
use crate::resolver::Resolver;

use super::dispatcher::{Command, CommandResult, EXIT_FAILURE};
use super::display::{load_catalog, load_profile, write_json};

/// Prints the choices, version options and inputs a recipe asks for.
pub struct ChoicesCommand {
    catalog: Option<PathBuf>,
    args: ToolArgs,
}

impl ChoicesCommand {
    pub fn new(catalog: Option<PathBuf>, args: ToolArgs) -> Self {
        Self { catalog, args }
    }
}

impl Command for ChoicesCommand {
    fn execute(&self, out: &mut dyn Write) -> Result<CommandResult> {
        let catalog = Arc::new(load_catalog(self.catalog.as_deref())?);
        let profile = load_profile(&self.args.profile)?;

        match Resolver::new(catalog).resolve_choices(&self.args.tool, &profile) {
            Ok(resolution) => {
                write_json(out, &resolution)?;
                Ok(CommandResult::success())
            }
            Err(e) => {
                write_json(out, &e)?;
                Ok(CommandResult::failure(EXIT_FAILURE))
            }
        }
    }
}
