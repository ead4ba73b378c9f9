//! CLI argument definitions.
//!
//! This module defines all CLI arguments using clap's derive macros.
//! The main entry point is the [`Cli`] struct.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// rigup - plan and run tool installs from declarative recipes.
#[derive(Debug, Parser)]
#[command(name = "rigup")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Recipe catalog file to use instead of the embedded catalog
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Validate recipe files (the embedded catalog when none are given)
    Validate(ValidateArgs),

    /// Resolve an install plan and print it as JSON
    Plan(PlanArgs),

    /// Show the open choices and inputs for a recipe
    Choices(ToolArgs),

    /// Resolve and execute an install plan
    Run(RunArgs),

    /// Update an installed tool
    Update(LifecycleArgs),

    /// Remove an installed tool
    Remove(LifecycleArgs),

    /// Print the JSON Schema of recipe documents
    Schema,
}

/// Arguments for the `validate` command.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ValidateArgs {
    /// Recipe YAML files to validate
    pub files: Vec<PathBuf>,

    /// Output format (human, json)
    #[arg(long, default_value = "human")]
    pub format: String,
}

/// A recipe id and the machine profile to resolve it against.
#[derive(Debug, Clone, clap::Args)]
pub struct ToolArgs {
    /// Recipe id
    pub tool: String,

    /// System profile JSON file ("-" reads stdin)
    #[arg(long, env = "RIGUP_PROFILE")]
    pub profile: PathBuf,
}

/// Arguments for the `plan` command.
#[derive(Debug, Clone, clap::Args)]
pub struct PlanArgs {
    #[command(flatten)]
    pub target: ToolArgs,

    /// Answer a choice or input (repeatable)
    #[arg(long = "answer", value_name = "KEY=VALUE", value_parser = parse_answer)]
    pub answers: Vec<(String, String)>,
}

/// Arguments for the `run` command.
#[derive(Debug, Clone, clap::Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub target: ToolArgs,

    /// Answer a choice or input (repeatable)
    #[arg(long = "answer", value_name = "KEY=VALUE", value_parser = parse_answer)]
    pub answers: Vec<(String, String)>,

    /// Accept the plan's confirmation gate
    #[arg(short, long)]
    pub yes: bool,

    /// Acknowledge high-risk steps (required for double-confirmation plans)
    #[arg(long)]
    pub i_understand: bool,

    /// Roll back completed steps when a step fails
    #[arg(long)]
    pub rollback: bool,

    /// Password piped to sudo
    #[arg(long, env = "RIGUP_SUDO_PASSWORD", hide_env_values = true)]
    pub sudo_password: Option<String>,
}

/// Arguments for `update` and `remove`.
#[derive(Debug, Clone, clap::Args)]
pub struct LifecycleArgs {
    #[command(flatten)]
    pub target: ToolArgs,

    /// Password piped to sudo
    #[arg(long, env = "RIGUP_SUDO_PASSWORD", hide_env_values = true)]
    pub sudo_password: Option<String>,
}

/// Parse `KEY=VALUE`.
pub fn parse_answer(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_repeated_answers() {
        let cli = Cli::parse_from([
            "rigup", "plan", "pytorch", "--profile", "p.json", "--answer", "backend=cuda",
            "--answer", "version=2.4.0",
        ]);
        let Commands::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        assert_eq!(args.target.tool, "pytorch");
        assert_eq!(
            args.answers,
            vec![
                ("backend".to_string(), "cuda".to_string()),
                ("version".to_string(), "2.4.0".to_string())
            ]
        );
    }

    #[test]
    fn answer_needs_equals() {
        assert!(parse_answer("backend").is_err());
        assert!(parse_answer("=x").is_err());
        assert_eq!(parse_answer("path=/a=b").unwrap().1, "/a=b");
    }

    #[test]
    fn run_flags() {
        let cli = Cli::parse_from([
            "rigup", "--debug", "run", "jq", "--profile", "-", "--yes", "--rollback",
        ]);
        assert!(cli.debug);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert!(args.yes && args.rollback);
        assert_eq!(args.target.profile, PathBuf::from("-"));
    }
}
