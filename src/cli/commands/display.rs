//! Shared output helpers.
//!
//! Commands print machine-readable JSON on stdout; these helpers keep the
//! formatting and the catalog/profile loading consistent across them.

use serde::Serialize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, RigupError};
use crate::profile::SystemProfile;
use crate::recipe::RecipeCatalog;
use crate::resolver::Answers;
use crate::risk::ConfirmationGate;

/// Pretty-print `value` as JSON followed by a newline.
pub fn write_json<T: Serialize + ?Sized>(out: &mut dyn Write, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(anyhow::Error::from)?;
    writeln!(out, "{}", json)?;
    Ok(())
}

/// One line describing what the gate asks for.
pub fn gate_summary(gate: &ConfirmationGate) -> String {
    match gate {
        ConfirmationGate::None => "No confirmation needed".to_string(),
        ConfirmationGate::Single { reason } => format!("Confirmation required: {}", reason),
        ConfirmationGate::Double {
            reason,
            high_risk_steps,
            acknowledgment,
        } => {
            let labels: Vec<&str> = high_risk_steps.iter().map(|s| s.label.as_str()).collect();
            format!(
                "Double confirmation required: {} ({}). {}",
                reason,
                labels.join(", "),
                acknowledgment
            )
        }
    }
}

/// The `--catalog` file, or the embedded catalog.
pub fn load_catalog(path: Option<&Path>) -> Result<RecipeCatalog> {
    match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|e| RigupError::ParseError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            RecipeCatalog::from_yaml_str(&content, path)
        }
        None => RecipeCatalog::builtin(),
    }
}

/// Read a profile document; `-` reads stdin.
pub fn load_profile(path: &Path) -> Result<SystemProfile> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        fs::read_to_string(path)?
    };
    SystemProfile::from_json(&content).map_err(|e| RigupError::ParseError {
        path: PathBuf::from(path),
        message: e.to_string(),
    })
}

/// Collect `--answer` pairs; later answers win.
pub fn answers(pairs: &[(String, String)]) -> Answers {
    pairs.iter().cloned().collect()
}
