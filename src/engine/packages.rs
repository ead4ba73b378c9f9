//! Batched package installs.

use tracing::info;

use super::StepContext;
use crate::profile::{package_install_command, package_manager_needs_sudo};
use crate::steps::StepOutcome;

/// Install whichever of `packages` are still missing.
///
/// The batch was computed at plan time; by now some packages may have been
/// installed by an earlier step or another process, so the package manager
/// is asked again.
pub(crate) fn install(
    ctx: &StepContext<'_>,
    package_manager: &str,
    packages: &[String],
    planned: &[String],
) -> StepOutcome {
    let missing = ctx.engine.host().missing_packages(package_manager, packages);
    if missing.is_empty() {
        return StepOutcome::skipped(format!("All {} package(s) already installed", packages.len()));
    }
    info!("Installing {} package(s): {}", missing.len(), missing.join(" "));

    let command = package_install_command(package_manager, &missing).unwrap_or_else(|| planned.to_vec());
    let needs_sudo = ctx.step.needs_sudo || package_manager_needs_sudo(package_manager);
    let mut outcome = ctx.run_outcome(
        &command,
        needs_sudo,
        None,
        format!("Installed {}", missing.join(", ")),
    );
    if outcome.ok && missing.len() < packages.len() {
        outcome.message = Some(format!(
            "Installed {} ({} already present)",
            missing.join(", "),
            packages.len() - missing.len()
        ));
    }
    outcome
}
