//! Validate command implementation.
//!
//! The `rigup validate` command checks recipe files against the schema rules
//! and reports every problem, not just the first.

use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::cli::args::ValidateArgs;
use crate::error::{Result, RigupError};
use crate::lint::{self, SchemaError};
use crate::recipe::catalog::parse_documents;
use crate::recipe::load_builtin_documents;

use super::dispatcher::{Command, CommandResult, EXIT_FAILURE};
use super::display::write_json;

/// The validate command implementation.
pub struct ValidateCommand {
    catalog: Option<PathBuf>,
    args: ValidateArgs,
}

impl ValidateCommand {
    /// Create a new validate command.
    pub fn new(catalog: Option<PathBuf>, args: ValidateArgs) -> Self {
        Self { catalog, args }
    }

    /// Files to check: positional files, else `--catalog`, else the
    /// embedded recipes.
    fn documents(&self) -> Result<BTreeMap<String, Value>> {
        let files: Vec<PathBuf> = if self.args.files.is_empty() {
            self.catalog.iter().cloned().collect()
        } else {
            self.args.files.clone()
        };
        if files.is_empty() {
            return load_builtin_documents();
        }

        let mut documents = BTreeMap::new();
        for file in &files {
            let content = fs::read_to_string(file).map_err(|e| RigupError::ParseError {
                path: file.clone(),
                message: e.to_string(),
            })?;
            for (id, doc) in parse_documents(&content, file)? {
                if documents.insert(id.clone(), doc).is_some() {
                    return Err(RigupError::ParseError {
                        path: file.clone(),
                        message: format!("Recipe '{}' is defined more than once", id),
                    });
                }
            }
        }
        Ok(documents)
    }

    fn report(&self, out: &mut dyn Write, count: usize, errors: &[SchemaError]) -> Result<()> {
        if self.args.format == "json" {
            return write_json(out, &json!({ "recipes": count, "errors": errors }));
        }
        if errors.is_empty() {
            writeln!(out, "{} recipes OK", count)?;
        } else {
            for error in errors {
                writeln!(out, "{}", error)?;
            }
            writeln!(out, "{} error(s) in {} recipes", errors.len(), count)?;
        }
        Ok(())
    }
}

impl Command for ValidateCommand {
    fn execute(&self, out: &mut dyn Write) -> Result<CommandResult> {
        let documents = self.documents()?;
        let errors = lint::validate_all(&documents);
        self.report(out, documents.len(), &errors)?;
        if errors.is_empty() {
            Ok(CommandResult::success())
        } else {
            Ok(CommandResult::failure(EXIT_FAILURE))
        }
    }
}
