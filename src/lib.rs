//! rigup - plan and run tool installs from declarative recipes.
//!
//! A recipe says how to install one thing (a tool, a data pack, or a
//! config file) on every platform it supports. Given a [`profile::SystemProfile`]
//! describing the machine, the resolver turns a recipe into an ordered,
//! risk-annotated [`resolver::Plan`]; the engine executes it step by step,
//! hands failures to the remediation layer, and can roll completed steps back.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`engine`] - Step execution, rollback, update and remove
//! - [`error`] - Error types and result aliases
//! - [`lint`] - Recipe schema validation
//! - [`profile`] - Machine profile and live host probes
//! - [`recipe`] - Recipe model and the embedded catalog
//! - [`remediation`] - Failure handlers and remediation options
//! - [`resolver`] - Method selection, dependencies, choices and plans
//! - [`risk`] - Step risk inference and confirmation gates
//! - [`shell`] - Subprocess execution and shell rc handling
//! - [`steps`] - Plan step and outcome types
//!
//! # Example
//!
//! ```
//! use rigup::recipe::RecipeCatalog;
//!
//! let catalog = RecipeCatalog::builtin().unwrap();
//! assert!(catalog.tool("docker").is_some());
//! ```

pub mod cli;
pub mod engine;
pub mod error;
pub mod lint;
pub mod profile;
pub mod recipe;
pub mod remediation;
pub mod resolver;
pub mod risk;
pub mod shell;
pub mod steps;

pub use error::{ResolutionError, Result, RigupError};
