//! Service control across init systems.

use super::StepContext;
use crate::profile::InitSystem;
use crate::steps::{ServiceAction, StepOutcome};

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

/// The command for `action` on `service` under `init`.
pub fn service_command(init: InitSystem, service: &str, action: ServiceAction) -> Vec<String> {
    let verb = action.as_str();
    match (init, action) {
        (InitSystem::Systemd, ServiceAction::Status) => {
            argv(&["systemctl", "is-active", "--quiet", service])
        }
        (InitSystem::Systemd, _) => argv(&["systemctl", verb, service]),

        (InitSystem::OpenRc, ServiceAction::Enable) => {
            argv(&["rc-update", "add", service, "default"])
        }
        (InitSystem::OpenRc, ServiceAction::Disable) => {
            argv(&["rc-update", "del", service, "default"])
        }
        (InitSystem::OpenRc, _) => argv(&["rc-service", service, verb]),

        (InitSystem::SysVinit, ServiceAction::Enable) => {
            argv(&["update-rc.d", service, "defaults"])
        }
        (InitSystem::SysVinit, ServiceAction::Disable) => {
            argv(&["update-rc.d", service, "remove"])
        }
        (InitSystem::SysVinit, _) => argv(&["service", service, verb]),
    }
}

/// Run a service step. `status` reports activity and never fails.
pub(crate) fn run(ctx: &StepContext<'_>, service: &str, action: ServiceAction) -> StepOutcome {
    let init = ctx.profile().init_system();
    let command = service_command(init, service, action);

    if action == ServiceAction::Status {
        let active = ctx
            .run_raw(&command, false, None)
            .map(|r| r.success)
            .unwrap_or(false);
        return StepOutcome {
            active: Some(active),
            ..StepOutcome::ok(format!(
                "{} is {}",
                service,
                if active { "active" } else { "inactive" }
            ))
        };
    }

    match ctx.run_raw(&command, true, None) {
        Ok(result) => StepOutcome::from_command(&result, format!("{} {}", service, past_tense(action))),
        Err(e) => StepOutcome::fail(e.to_string()),
    }
}

fn past_tense(action: ServiceAction) -> &'static str {
    match action {
        ServiceAction::Start => "started",
        ServiceAction::Stop => "stopped",
        ServiceAction::Restart => "restarted",
        ServiceAction::Enable => "enabled",
        ServiceAction::Disable => "disabled",
        ServiceAction::Status => "checked",
    }
}
