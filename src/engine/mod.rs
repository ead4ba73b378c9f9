//! Step execution.
//!
//! The [`Engine`] runs a resolved [`Plan`] against the real machine. Each
//! step type has its own executor; every executor returns a
//! [`StepOutcome`] instead of an error, so a failed step is data the caller
//! can render, remediate or roll back.
//!
//! # Modules
//!
//! - [`command`] - Tool, post-install and repo-setup commands, curl-pipe scripts
//! - [`packages`] - Batched package installs with a fresh re-probe
//! - [`verify`] - Binary verification on a widened PATH
//! - [`download`] - Resumable, authenticated, checksummed downloads
//! - [`service`] - systemd / OpenRC / sysvinit service control
//! - [`config`] - File writes and the template pipeline
//! - [`release`] - GitHub release asset installs
//! - [`shell_config`] - Idempotent rc-file edits
//! - [`rollback`] - Undo commands and best-effort rollback
//! - [`lifecycle`] - Update and remove

pub mod backup;
pub mod command;
pub mod config;
pub mod download;
pub mod freshness;
pub mod lifecycle;
pub mod packages;
pub mod release;
pub mod rollback;
pub mod service;
pub mod shell_config;
pub mod verify;

pub use freshness::{check_freshness, Freshness, FreshnessReport, FreshnessStore};
pub use lifecycle::{LifecycleAction, LifecycleOutcome};
pub use rollback::{rollback_steps, undo_command, UndoTarget, UNDO_COMMANDS};

use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::Result;
use crate::profile::{Host, LiveHost, SystemProfile};
use crate::remediation::{FailureContext, RemediationService};
use crate::resolver::Plan;
use crate::shell::{
    execute_argv, join_argv, sudo_wrap, CommandOptions, CommandResult, DEFAULT_TIMEOUT_SECS,
};
use crate::steps::{PlanOutcome, RollbackReport, Step, StepAction, StepOutcome};

/// Default timeout for build-directory installs, in seconds.
pub const INSTALL_TIMEOUT_SECS: u64 = 600;

/// Freshness stamps file inside the state directory.
pub const FRESHNESS_FILE: &str = "freshness.json";

/// Free bytes available at a path.
pub type FreeSpaceFn = Box<dyn Fn(&Path) -> io::Result<u64>>;

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Timeout for ordinary subprocesses.
    pub default_timeout: u64,
    /// Timeout for `install` steps.
    pub install_timeout: u64,
    /// Where persisted engine state (freshness stamps) lives.
    pub state_dir: PathBuf,
    /// Home directory for `~/.local/bin` and rc files.
    pub home: PathBuf,
    /// GitHub API base for release lookups.
    pub github_api: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT_SECS,
            install_timeout: INSTALL_TIMEOUT_SECS,
            state_dir: dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("rigup"),
            home: dirs::home_dir().unwrap_or_else(|| PathBuf::from("/root")),
            github_api: crate::resolver::versions::GITHUB_API.to_string(),
        }
    }
}

/// Executes plans, single steps and rollbacks.
pub struct Engine {
    profile: SystemProfile,
    host: Box<dyn Host>,
    options: EngineOptions,
    client: Client,
    free_space: FreeSpaceFn,
    remediation: Option<Box<dyn RemediationService>>,
}

impl Engine {
    /// An engine for the live machine described by `profile`.
    pub fn new(profile: SystemProfile) -> Self {
        let client = Client::builder()
            .user_agent(concat!("rigup/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(15))
            .timeout(None::<Duration>)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            profile,
            host: Box::new(LiveHost::new()),
            options: EngineOptions::default(),
            client,
            free_space: Box::new(|path: &Path| fs2::available_space(path)),
            remediation: None,
        }
    }

    pub fn with_host(mut self, host: Box<dyn Host>) -> Self {
        self.host = host;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the free-space query used by the download pre-flight.
    pub fn with_free_space(mut self, free_space: impl Fn(&Path) -> io::Result<u64> + 'static) -> Self {
        self.free_space = Box::new(free_space);
        self
    }

    /// Attach a remediation service consulted when a plan step fails.
    pub fn with_remediation(mut self, service: Box<dyn RemediationService>) -> Self {
        self.remediation = Some(service);
        self
    }

    pub fn profile(&self) -> &SystemProfile {
        &self.profile
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub(crate) fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn free_space(&self, path: &Path) -> io::Result<u64> {
        (self.free_space)(path)
    }

    /// The freshness stamp store.
    pub fn freshness(&self) -> FreshnessStore {
        FreshnessStore::new(self.options.state_dir.join(FRESHNESS_FILE))
    }

    /// Run one step.
    pub fn execute_step(
        &self,
        step: &Step,
        sudo_password: Option<&str>,
        env: Option<&HashMap<String, String>>,
    ) -> StepOutcome {
        let ctx = StepContext::new(self, step, sudo_password, env);
        info!("Running step: {}", step.label);

        let (backup, backup_warnings) = ctx.backup_targets();
        let mut outcome = match &step.action {
            StepAction::RepoSetup { steps } => command::run_repo_setup(&ctx, steps),
            StepAction::Packages {
                package_manager,
                packages,
                command,
            } => packages::install(&ctx, package_manager, packages, command),
            StepAction::Tool {
                command,
                script_sha256,
                cwd,
            } => command::run_command(&ctx, command, script_sha256.as_deref(), cwd.as_deref()),
            StepAction::PostInstall {
                command,
                script_sha256,
            } => command::run_command(&ctx, command, script_sha256.as_deref(), None),
            StepAction::Verify { command } => verify::verify(&ctx, command),
            StepAction::Config(config) => config::apply(&ctx, config),
            StepAction::Download(download) => download::run(&ctx, download),
            StepAction::Service { service, action } => service::run(&ctx, service, *action),
            StepAction::GithubRelease(release) => release::install(&ctx, release),
            StepAction::ShellConfig { lines, rc_file } => {
                shell_config::apply(&ctx, lines, rc_file.as_deref())
            }
            StepAction::Notification { message } => StepOutcome::ok(message.clone()),
            StepAction::Install { command, cwd } => ctx.run_outcome(
                command,
                step.needs_sudo,
                cwd.as_deref().map(Path::new),
                format!("{} done", step.label),
            ),
            StepAction::Cleanup { path } => command::cleanup(&ctx, path),
        };

        outcome.warnings.extend(backup_warnings);
        if outcome.backup.is_none() {
            outcome.backup = backup;
        }
        if !outcome.ok {
            warn!(
                "Step '{}' failed: {}",
                step.label,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
        outcome
    }

    /// Run a plan's steps in order, stopping at the first failure.
    pub fn execute_plan(&self, plan: &Plan, sudo_password: Option<&str>) -> PlanOutcome {
        let mut result = PlanOutcome {
            tool: plan.tool.clone(),
            ok: true,
            ..Default::default()
        };
        if plan.already_installed {
            info!("{} is already installed", plan.tool);
            return result;
        }

        for (index, step) in plan.steps.iter().enumerate() {
            let outcome = self.execute_step(step, sudo_password, None);
            let failed = !outcome.ok;
            if failed {
                result.ok = false;
                result.failed_step = Some(index);
                if let Some(service) = &self.remediation {
                    let ctx = FailureContext {
                        tool: step.tool_id.clone().unwrap_or_else(|| plan.tool.clone()),
                        step_index: index,
                        step_label: step.label.clone(),
                        exit_code: outcome.exit_code,
                        stderr: outcome.stderr.clone(),
                        method: step_method(plan, step),
                        profile: self.profile.clone(),
                    };
                    result.remediation = service.remediate(&ctx);
                }
            }
            result.steps.push(outcome);
            if failed {
                break;
            }
        }
        info!(
            "Plan for {} {}",
            plan.tool,
            if result.ok { "completed" } else { "failed" }
        );
        result
    }

    /// Run rollback steps in order, continuing past failures.
    pub fn execute_rollback(&self, steps: &[Step], sudo_password: Option<&str>) -> RollbackReport {
        let mut report = RollbackReport::default();
        for step in steps {
            let outcome = self.execute_step(step, sudo_password, None);
            report.steps_run += 1;
            if !outcome.ok {
                report.steps_failed += 1;
                report.errors.push(format!(
                    "{}: {}",
                    step.label,
                    outcome.error.unwrap_or_else(|| "failed".to_string())
                ));
            }
        }
        report.ok = report.steps_failed == 0;
        if !report.ok {
            warn!(
                "Rollback finished with {} of {} step(s) failing",
                report.steps_failed, report.steps_run
            );
        }
        report
    }
}

/// Everything an executor needs to run one step.
pub(crate) struct StepContext<'a> {
    pub engine: &'a Engine,
    pub step: &'a Step,
    pub sudo_password: Option<&'a str>,
    pub env: HashMap<String, String>,
}

impl<'a> StepContext<'a> {
    pub fn new(
        engine: &'a Engine,
        step: &'a Step,
        sudo_password: Option<&'a str>,
        env: Option<&HashMap<String, String>>,
    ) -> Self {
        Self {
            engine,
            step,
            sudo_password,
            env: env.cloned().unwrap_or_default(),
        }
    }

    pub fn profile(&self) -> &SystemProfile {
        &self.engine.profile
    }

    pub fn timeout(&self) -> u64 {
        self.step.timeout.unwrap_or(match self.step.action {
            StepAction::Install { .. } => self.engine.options.install_timeout,
            _ => self.engine.options.default_timeout,
        })
    }

    /// Whether a command needing root must go through sudo.
    pub fn use_sudo(&self, needs_sudo: bool) -> bool {
        needs_sudo && !self.profile().capabilities.is_root
    }

    /// Run an argv, sourcing the step's `post_env` first and wrapping sudo.
    pub fn run(&self, argv: &[String], needs_sudo: bool, cwd: Option<&Path>) -> Result<CommandResult> {
        let argv = match &self.step.post_env {
            Some(env) => vec![
                "bash".to_string(),
                "-c".to_string(),
                format!("{}\n{}", env, join_argv(argv)),
            ],
            None => argv.to_vec(),
        };
        self.run_raw(&argv, needs_sudo, cwd)
    }

    /// Run an argv as-is apart from sudo wrapping.
    pub fn run_raw(&self, argv: &[String], needs_sudo: bool, cwd: Option<&Path>) -> Result<CommandResult> {
        let (argv, stdin) = if self.use_sudo(needs_sudo) {
            sudo_wrap(argv, self.sudo_password)
        } else {
            (argv.to_vec(), None)
        };
        let options = CommandOptions {
            cwd: cwd.map(Path::to_path_buf),
            env: self.env.clone(),
            stdin,
            ..CommandOptions::captured(self.timeout())
        };
        execute_argv(&argv, &options)
    }

    /// [`run`](Self::run) mapped onto a step outcome.
    pub fn run_outcome(
        &self,
        argv: &[String],
        needs_sudo: bool,
        cwd: Option<&Path>,
        success: impl Into<String>,
    ) -> StepOutcome {
        match self.run(argv, needs_sudo, cwd) {
            Ok(result) => StepOutcome::from_command(&result, success),
            Err(e) => StepOutcome::fail(e.to_string()),
        }
    }

    /// Back up the step's declared targets.
    fn backup_targets(&self) -> (Option<PathBuf>, Vec<String>) {
        let mut first = None;
        let mut warnings = Vec::new();
        for target in &self.step.backup_before {
            match backup::backup_path(self, Path::new(target)) {
                Ok(Some(path)) => {
                    first.get_or_insert(path);
                }
                Ok(None) => {}
                Err(e) => warnings.push(format!("Could not back up {}: {}", target, e)),
            }
        }
        (first, warnings)
    }
}

/// Install method behind a failed step. Dependency steps without their own
/// method get none, so remediation falls back to reading stderr.
fn step_method(plan: &Plan, step: &Step) -> Option<String> {
    match (&step.method, step.tool_id.as_deref()) {
        (Some(method), _) => Some(method.clone()),
        (None, Some(owner)) if owner != plan.tool => None,
        (None, _) => plan.method.clone(),
    }
}

/// Hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::profile::fixtures;
    use crate::profile::host::fake::FakeHost;
    use tempfile::TempDir;

    /// A root engine (no sudo wrapping) with state under `dir`.
    pub fn engine(dir: &TempDir) -> Engine {
        let mut profile = fixtures::debian();
        profile.capabilities.is_root = true;
        Engine::new(profile)
            .with_host(Box::new(FakeHost::empty()))
            .with_options(EngineOptions {
                state_dir: dir.path().join("state"),
                home: dir.path().join("home"),
                ..EngineOptions::default()
            })
    }

    pub fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    pub fn tool_step(label: &str, command: &[&str]) -> Step {
        Step::new(
            label,
            StepAction::Tool {
                command: argv(command),
                script_sha256: None,
                cwd: None,
            },
        )
    }
}
