//! Idempotent shell rc-file edits.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use super::{backup, StepContext};
use crate::shell::{detect_shell, rc_file_for, ShellType};
use crate::steps::StepOutcome;

/// Append the lines missing from the rc file, translated for its shell.
pub(crate) fn apply(ctx: &StepContext<'_>, lines: &[String], rc_file: Option<&str>) -> StepOutcome {
    let (rc, shell) = match rc_file {
        Some(path) => {
            let path = PathBuf::from(path);
            let shell = if path.to_string_lossy().ends_with(".fish") {
                ShellType::Fish
            } else {
                ShellType::Bash
            };
            (path, shell)
        }
        None => {
            let detected = detect_shell();
            let home = &ctx.engine.options().home;
            match rc_file_for(detected.name, home) {
                Some(path) => (path, detected.name),
                None => return StepOutcome::fail("Could not determine a shell rc file"),
            }
        }
    };

    let existing = fs::read_to_string(&rc).unwrap_or_default();
    let mut seen: HashSet<String> = existing.lines().map(|l| l.trim().to_string()).collect();
    let missing: Vec<String> = lines
        .iter()
        .map(|l| shell.translate_line(l))
        .filter(|l| seen.insert(l.trim().to_string()))
        .collect();
    if missing.is_empty() {
        return StepOutcome::skipped(format!("{} already configured", rc.display()));
    }

    let mut outcome = StepOutcome::ok(format!(
        "Added {} line(s) to {}",
        missing.len(),
        rc.display()
    ))
    .with_path(rc.clone());
    outcome.needs_shell_restart = true;
    match backup::backup_path(ctx, &rc) {
        Ok(b) => outcome.backup = b,
        Err(e) => outcome = outcome.with_warning(format!("Could not back up {}: {}", rc.display(), e)),
    }

    let mut block = String::new();
    if !existing.is_empty() && !existing.ends_with('\n') {
        block.push('\n');
    }
    for line in &missing {
        block.push_str(line);
        block.push('\n');
    }
    let written = rc
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|_| OpenOptions::new().create(true).append(true).open(&rc))
        .and_then(|mut f| f.write_all(block.as_bytes()));
    if let Err(e) = written {
        return StepOutcome::fail(format!("Cannot update {}: {}", rc.display(), e));
    }
    outcome
}
