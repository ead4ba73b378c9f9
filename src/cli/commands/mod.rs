//! CLI command implementations.
//!
//! Each command implements the [`Command`] trait, which provides a uniform
//! interface for executing commands and reporting results.
//!
//! # Architecture
//!
//! Commands are dispatched via [`CommandDispatcher`], which routes CLI
//! subcommands to their implementations. Every command writes JSON (or a
//! short human report for `validate`) to the writer it is given, so the
//! binary and the tests share one code path.

pub mod choices;
pub mod dispatcher;
pub mod display;
pub mod lifecycle;
pub mod plan;
pub mod run;
pub mod schema;
pub mod validate;

pub use dispatcher::{Command, CommandDispatcher, CommandResult};
