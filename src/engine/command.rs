//! Command-shaped steps: tool installs, post-install hooks, repository
//! bootstrap and build-directory cleanup.
//!
//! A `curl URL | sh` command is never piped. The script is downloaded to a
//! temp file, hashed, checked against `script_sha256` when one is declared,
//! and only then run from that file.

use anyhow::Context;
use regex::Regex;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{sha256_file, StepContext};
use crate::recipe::CommandStepSpec;
use crate::steps::StepOutcome;

static CURL_PIPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*curl\s+(?:[^|]*?\s)?(?P<url>https?://[^\s|'\x22]+)[^|]*\|\s*(?P<sudo>sudo\s+(?:-E\s+)?)?(?P<shell>bash|sh)\b(?P<args>[^;&|]*)$",
    )
    .expect("CURL_PIPE must compile")
});

/// A `curl URL | [sudo] sh args` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurlPipe {
    pub url: String,
    pub sudo: bool,
    pub shell: String,
    /// Arguments for the script itself (`sh -s -- -y` → `[-y]`).
    pub args: Vec<String>,
}

/// Recognize `[bash|sh, -c, "curl ... URL | sh ..."]`.
pub fn parse_curl_pipe(argv: &[String]) -> Option<CurlPipe> {
    let [shell, flag, script] = argv else {
        return None;
    };
    if !matches!(shell.as_str(), "bash" | "sh") || flag != "-c" {
        return None;
    }
    let caps = CURL_PIPE.captures(script)?;

    let mut args: Vec<String> = caps["args"].split_whitespace().map(String::from).collect();
    if args.first().is_some_and(|a| a == "-s") {
        args.remove(0);
    }
    if args.first().is_some_and(|a| a == "--") {
        args.remove(0);
    }
    Some(CurlPipe {
        url: caps["url"].to_string(),
        sudo: caps.name("sudo").is_some(),
        shell: caps["shell"].to_string(),
        args,
    })
}

/// Run a tool or post-install command.
pub(crate) fn run_command(
    ctx: &StepContext<'_>,
    command: &[String],
    script_sha256: Option<&str>,
    cwd: Option<&str>,
) -> StepOutcome {
    let cwd = cwd.map(Path::new);
    if let Some(pipe) = parse_curl_pipe(command) {
        return run_piped_script(ctx, &pipe, script_sha256, cwd);
    }
    ctx.run_outcome(
        command,
        ctx.step.needs_sudo,
        cwd,
        format!("{} done", ctx.step.label),
    )
}

fn fetch_script(ctx: &StepContext<'_>, url: &str) -> anyhow::Result<NamedTempFile> {
    let response = ctx
        .engine
        .client()
        .get(url)
        .send()
        .with_context(|| format!("requesting {}", url))?
        .error_for_status()?;
    let body = response.bytes().context("reading script body")?;
    let mut file = NamedTempFile::with_prefix("rigup-script-")?;
    file.write_all(&body)?;
    file.flush()?;
    Ok(file)
}

fn run_piped_script(
    ctx: &StepContext<'_>,
    pipe: &CurlPipe,
    expected: Option<&str>,
    cwd: Option<&Path>,
) -> StepOutcome {
    let script = match fetch_script(ctx, &pipe.url) {
        Ok(file) => file,
        Err(e) => return StepOutcome::fail(format!("Failed to download {}: {:#}", pipe.url, e)),
    };
    let digest = match sha256_file(script.path()) {
        Ok(d) => d,
        Err(e) => return StepOutcome::fail(format!("Failed to hash {}: {}", pipe.url, e)),
    };

    let mut warnings = Vec::new();
    match expected {
        Some(expected) if !expected.eq_ignore_ascii_case(&digest) => {
            return StepOutcome::fail(format!(
                "Script checksum mismatch for {}: expected {}, got {}",
                pipe.url, expected, digest
            ));
        }
        Some(_) => debug!("Script {} verified", pipe.url),
        None => {
            warn!("No script_sha256 for {}; running it unverified", pipe.url);
            warnings.push(format!(
                "{} was not checksum-verified (sha256 {})",
                pipe.url, digest
            ));
        }
    }

    let mut argv = vec![pipe.shell.clone(), script.path().display().to_string()];
    argv.extend(pipe.args.iter().cloned());
    let mut outcome = ctx.run_outcome(
        &argv,
        ctx.step.needs_sudo || pipe.sudo,
        cwd,
        format!("{} done", ctx.step.label),
    );
    outcome.warnings.extend(warnings);
    outcome
}

/// Run repository bootstrap sub-steps in order, aborting on the first failure.
pub(crate) fn run_repo_setup(ctx: &StepContext<'_>, steps: &[CommandStepSpec]) -> StepOutcome {
    let mut last = StepOutcome::ok(format!("{} done", ctx.step.label));
    for (i, sub) in steps.iter().enumerate() {
        debug!("Repo setup {}/{}: {}", i + 1, steps.len(), sub.label);
        let outcome = ctx.run_outcome(&sub.command, sub.needs_sudo, None, &sub.label);
        if !outcome.ok {
            let error = format!(
                "'{}' failed: {}",
                sub.label,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
            return StepOutcome {
                error: Some(error),
                ..outcome
            };
        }
        last.stdout.push_str(&outcome.stdout);
    }
    last
}

/// Remove a build directory. Never fails the plan.
pub(crate) fn cleanup(ctx: &StepContext<'_>, path: &str) -> StepOutcome {
    let target = Path::new(path);
    if !target.exists() {
        return StepOutcome::skipped(format!("{} already removed", path));
    }
    if std::fs::remove_dir_all(target).is_ok() {
        return StepOutcome::ok(format!("Removed {}", path));
    }
    let argv = vec!["rm".to_string(), "-rf".to_string(), path.to_string()];
    match ctx.run_raw(&argv, true, None) {
        Ok(r) if r.success => StepOutcome::ok(format!("Removed {}", path)),
        Ok(r) => StepOutcome::ok("Cleanup incomplete")
            .with_warning(format!("Could not remove {}: {}", path, r.error_message())),
        Err(e) => StepOutcome::ok("Cleanup incomplete")
            .with_warning(format!("Could not remove {}: {}", path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{argv, engine, tool_step};
    use crate::steps::{Step, StepAction};
    use httpmock::prelude::*;
    use tempfile::TempDir;

    #[test]
    fn parses_rustup_style_pipe() {
        let cmd = argv(&[
            "bash",
            "-c",
            "curl --proto '=https' --tlsv1.2 -sSf https://sh.rustup.rs | sh -s -- -y",
        ]);
        let pipe = parse_curl_pipe(&cmd).unwrap();
        assert_eq!(pipe.url, "https://sh.rustup.rs");
        assert_eq!(pipe.shell, "sh");
        assert_eq!(pipe.args, vec!["-y"]);
        assert!(!pipe.sudo);
    }

    #[test]
    fn parses_sudo_pipe() {
        let cmd = argv(&["sh", "-c", "curl -fsSL https://get.docker.com | sudo bash"]);
        let pipe = parse_curl_pipe(&cmd).unwrap();
        assert!(pipe.sudo);
        assert_eq!(pipe.shell, "bash");
    }

    #[test]
    fn non_pipes_are_not_matched() {
        let cmd = argv(&[
            "bash",
            "-c",
            "curl -fsSLo /tmp/k https://dl.k8s.io/k && install -m 0755 /tmp/k /usr/local/bin/k",
        ]);
        assert!(parse_curl_pipe(&cmd).is_none());
        assert!(parse_curl_pipe(&argv(&["cargo", "install", "x"])).is_none());
    }

    fn pipe_step(url: &str, sha: Option<String>) -> Step {
        Step::new(
            "Run installer",
            StepAction::Tool {
                command: argv(&["bash", "-c", &format!("curl -fsSL {} | sh", url)]),
                script_sha256: sha,
                cwd: None,
            },
        )
    }

    #[test]
    fn verified_script_runs_from_tempfile() {
        let server = MockServer::start();
        let body = "echo installed-from-script";
        server.mock(|when, then| {
            when.method(GET).path("/install.sh");
            then.status(200).body(body);
        });
        let dir = TempDir::new().unwrap();
        let digest = {
            let path = dir.path().join("s");
            std::fs::write(&path, body).unwrap();
            sha256_file(&path).unwrap()
        };

        let step = pipe_step(&server.url("/install.sh"), Some(digest));
        let outcome = engine(&dir).execute_step(&step, None, None);
        assert!(outcome.ok, "{:?}", outcome.error);
        assert!(outcome.stdout.contains("installed-from-script"));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn checksum_mismatch_refuses_to_run() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/install.sh");
            then.status(200).body("touch should-not-exist");
        });
        let dir = TempDir::new().unwrap();
        let step = pipe_step(&server.url("/install.sh"), Some("00".repeat(32)));
        let outcome = engine(&dir).execute_step(&step, None, None);
        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().contains("checksum mismatch"));
        assert!(!Path::new("should-not-exist").exists());
    }

    #[test]
    fn missing_hash_warns_but_runs() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/install.sh");
            then.status(200).body("echo ok");
        });
        let dir = TempDir::new().unwrap();
        let outcome = engine(&dir).execute_step(&pipe_step(&server.url("/install.sh"), None), None, None);
        assert!(outcome.ok);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn repo_setup_aborts_on_first_failure() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("third-ran");
        let sub = |label: &str, cmd: Vec<String>| CommandStepSpec {
            label: label.into(),
            command: cmd,
            ..Default::default()
        };
        let step = Step::new(
            "Configure repository",
            StepAction::RepoSetup {
                steps: vec![
                    sub("key", argv(&["true"])),
                    sub("source", argv(&["false"])),
                    sub("refresh", argv(&["touch", &marker.display().to_string()])),
                ],
            },
        );
        let outcome = engine(&dir).execute_step(&step, None, None);
        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().starts_with("'source' failed"));
        assert!(!marker.exists());
    }

    #[test]
    fn cleanup_is_best_effort() {
        let dir = TempDir::new().unwrap();
        let build = dir.path().join("build");
        std::fs::create_dir_all(build.join("src")).unwrap();
        let step = Step::new(
            "Remove build directory",
            StepAction::Cleanup {
                path: build.display().to_string(),
            },
        );
        let engine = engine(&dir);
        assert!(engine.execute_step(&step, None, None).ok);
        assert!(!build.exists());
        let again = engine.execute_step(&step, None, None);
        assert!(again.ok && again.skipped);
    }

    #[test]
    fn tool_step_honors_cwd() {
        let dir = TempDir::new().unwrap();
        let mut step = tool_step("pwd", &["pwd"]);
        if let StepAction::Tool { cwd, .. } = &mut step.action {
            *cwd = Some(dir.path().display().to_string());
        }
        let outcome = engine(&dir).execute_step(&step, None, None);
        assert!(outcome.stdout.trim().ends_with(
            dir.path().file_name().unwrap().to_str().unwrap()
        ));
    }
}
