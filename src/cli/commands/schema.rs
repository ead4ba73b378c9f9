//! Schema command implementation.

use std::io::Write;

use crate::error::Result;
use crate::lint::SchemaGenerator;

use super::dispatcher::{Command, CommandResult};
use super::display::write_json;

/// Prints the JSON Schema of recipe catalog files.
pub struct SchemaCommand;

impl Command for SchemaCommand {
    fn execute(&self, out: &mut dyn Write) -> Result<CommandResult> {
        write_json(out, &SchemaGenerator::new().generate())?;
        Ok(CommandResult::success())
    }
}
