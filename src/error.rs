//! Error types for rigup operations.
//!
//! This module defines [`RigupError`], the primary error type used throughout
//! the crate, [`ResolutionError`] for plan resolution, and a [`Result`] type
//! alias for convenience.
//!
//! # Error Handling Strategy
//!
//! - Resolution failures are values (`Result<Plan, ResolutionError>`) so a
//!   caller can render them instead of crashing
//! - Step execution failures are data inside [`crate::steps::StepOutcome`]
//! - Use `RigupError` for load-time and plumbing failures
//! - Use `anyhow::Error` (via `RigupError::Other`) for unexpected errors

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::lint::SchemaError;

/// Core error type for rigup operations.
#[derive(Debug, Error)]
pub enum RigupError {
    /// One or more recipes in the catalog failed schema validation.
    #[error("Recipe catalog is invalid ({} error(s)): {}", errors.len(), summarize(errors))]
    InvalidCatalog { errors: Vec<SchemaError> },

    /// Failed to parse a recipe or profile document.
    #[error("Failed to parse {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    /// Plan resolution failed.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// A step failed during execution.
    #[error("Step '{step}' failed: {message}")]
    StepFailed { step: String, message: String },

    /// Shell command could not be spawned.
    #[error("Command failed with exit code {code:?}: {command}")]
    CommandFailed { command: String, code: Option<i32> },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic wrapped error for anyhow interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn summarize(errors: &[SchemaError]) -> String {
    errors
        .iter()
        .take(3)
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias for rigup operations.
pub type Result<T> = std::result::Result<T, RigupError>;

/// Why a plan could not be produced.
///
/// Every variant names the tool it was resolving, so a caller can always
/// attribute the failure.
#[derive(Debug, Clone, Error, Serialize, PartialEq)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ResolutionError {
    /// The tool id is not in the catalog.
    #[error("No recipe for '{tool}'")]
    UnknownTool { tool: String },

    /// No install method on this machine can install the tool.
    #[error("No install method available for '{tool}' (unavailable: {})", unavailable.join(", "))]
    NoInstallMethod {
        tool: String,
        /// Methods the recipe supports that this system cannot use.
        unavailable: Vec<String>,
    },

    /// A dependency in the chain has no usable install method.
    #[error("Dependency '{dependency}' of '{tool}' has no install method")]
    DependencyUnresolvable { tool: String, dependency: String },

    /// A user answer referenced a choice or option that does not exist.
    #[error("Invalid answer for '{tool}': {message}")]
    InvalidAnswer { tool: String, message: String },

    /// The recipe's kind does not support the requested operation.
    #[error("Recipe '{tool}' is a {kind} recipe: {message}")]
    UnsupportedRecipe {
        tool: String,
        kind: String,
        message: String,
    },
}

impl ResolutionError {
    /// The tool the failed resolution was for.
    pub fn tool(&self) -> &str {
        match self {
            ResolutionError::UnknownTool { tool }
            | ResolutionError::NoInstallMethod { tool, .. }
            | ResolutionError::DependencyUnresolvable { tool, .. }
            | ResolutionError::InvalidAnswer { tool, .. }
            | ResolutionError::UnsupportedRecipe { tool, .. } => tool,
        }
    }
}
