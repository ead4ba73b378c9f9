//! Command dispatching.
//!
//! This module provides the core command infrastructure:
//! - [`Command`] trait for implementing commands
//! - [`CommandResult`] for uniform result reporting
//! - [`CommandDispatcher`] for routing CLI subcommands

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::cli::args::{Cli, Commands};
use crate::engine::LifecycleAction;
use crate::error::Result;

use super::choices::ChoicesCommand;
use super::lifecycle::LifecycleCommand;
use super::plan::PlanCommand;
use super::run::RunCommand;
use super::schema::SchemaCommand;
use super::validate::ValidateCommand;

/// Exit code when resolution fails or a step fails.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code when the plan's confirmation gate was not acknowledged.
pub const EXIT_NOT_CONFIRMED: i32 = 3;

/// Trait for command implementations.
///
/// Each CLI subcommand implements this trait to provide its execution logic.
pub trait Command {
    /// Execute the command, writing its report to `out`.
    fn execute(&self, out: &mut dyn Write) -> Result<CommandResult>;
}

/// Result of command execution.
#[derive(Debug)]
pub struct CommandResult {
    /// Whether the command succeeded.
    pub success: bool,

    /// Exit code to use (0 for success, non-zero for failure).
    pub exit_code: i32,
}

impl CommandResult {
    /// Create a successful result.
    pub fn success() -> Self {
        Self {
            success: true,
            exit_code: 0,
        }
    }

    /// Create a failure result.
    pub fn failure(exit_code: i32) -> Self {
        Self {
            success: false,
            exit_code,
        }
    }
}

/// Dispatches CLI commands to their implementations.
pub struct CommandDispatcher {
    catalog: Option<PathBuf>,
}

impl CommandDispatcher {
    /// Create a dispatcher, optionally reading recipes from a catalog file.
    pub fn new(catalog: Option<PathBuf>) -> Self {
        Self { catalog }
    }

    /// The catalog file override, if any.
    pub fn catalog(&self) -> Option<&Path> {
        self.catalog.as_deref()
    }

    /// Dispatch and execute a command.
    pub fn dispatch(&self, cli: &Cli, out: &mut dyn Write) -> Result<CommandResult> {
        let catalog = self.catalog.clone();
        match &cli.command {
            Commands::Validate(args) => ValidateCommand::new(catalog, args.clone()).execute(out),
            Commands::Plan(args) => PlanCommand::new(catalog, args.clone()).execute(out),
            Commands::Choices(args) => ChoicesCommand::new(catalog, args.clone()).execute(out),
            Commands::Run(args) => RunCommand::new(catalog, args.clone()).execute(out),
            Commands::Update(args) => {
                LifecycleCommand::new(catalog, LifecycleAction::Update, args.clone()).execute(out)
            }
            Commands::Remove(args) => {
                LifecycleCommand::new(catalog, LifecycleAction::Remove, args.clone()).execute(out)
            }
            Commands::Schema => SchemaCommand.execute(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn command_result_success() {
        let result = CommandResult::success();
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
    }

    #[test]
    fn command_result_failure() {
        let result = CommandResult::failure(1);
        assert!(!result.success);
        assert_eq!(result.exit_code, 1);
    }

    #[test]
    fn dispatcher_keeps_catalog_override() {
        let dispatcher = CommandDispatcher::new(Some(PathBuf::from("/tmp/recipes.yml")));
        assert_eq!(dispatcher.catalog(), Some(Path::new("/tmp/recipes.yml")));
    }

    #[test]
    fn dispatches_schema() {
        let cli = Cli::parse_from(["rigup", "schema"]);
        let mut out = Vec::new();
        let result = CommandDispatcher::new(None).dispatch(&cli, &mut out).unwrap();
        assert!(result.success);
        assert!(String::from_utf8(out).unwrap().contains("rigup recipe catalog"));
    }
}
