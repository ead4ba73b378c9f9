//! Post-install verification.

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use super::StepContext;
use crate::profile::widened_path;
use crate::steps::StepOutcome;

static PATH_EXPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*(?:export\s+)?PATH=["']?([^"'\n]+)["']?"#).expect("PATH_EXPORT must compile")
});

/// Directories a `post_env` snippet prepends to PATH.
pub fn post_env_dirs(post_env: &str, home: &Path) -> Vec<PathBuf> {
    let home = home.display().to_string();
    PATH_EXPORT
        .captures_iter(post_env)
        .flat_map(|caps| {
            caps[1]
                .split(':')
                .filter(|p| !p.is_empty() && *p != "$PATH" && *p != "${PATH}")
                .map(|p| {
                    let p = p
                        .replace("${HOME}", &home)
                        .replace("$HOME", &home);
                    match p.strip_prefix("~/") {
                        Some(rest) => PathBuf::from(&home).join(rest),
                        None => PathBuf::from(p),
                    }
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Run the verify command, resolving its binary on a widened PATH first.
pub(crate) fn verify(ctx: &StepContext<'_>, command: &[String]) -> StepOutcome {
    let Some(binary) = command.first() else {
        return StepOutcome::fail("Empty verify command");
    };

    let extra = ctx
        .step
        .post_env
        .as_deref()
        .map(|env| post_env_dirs(env, &ctx.engine.options().home))
        .unwrap_or_default();
    let search = widened_path(&extra);
    let joined = match std::env::join_paths(&search) {
        Ok(p) => p,
        Err(e) => return StepOutcome::fail(format!("Invalid PATH entry: {}", e)),
    };
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));

    let Ok(resolved) = which::which_in(binary, Some(&joined), cwd) else {
        return StepOutcome {
            needs_shell_restart: true,
            ..StepOutcome::fail(format!(
                "'{}' is not on PATH yet; open a new shell and run the verify again",
                binary
            ))
        };
    };

    let mut argv = command.to_vec();
    argv[0] = resolved.display().to_string();
    let mut env = ctx.env.clone();
    env.insert("PATH".to_string(), joined.to_string_lossy().into_owned());
    let verify_ctx = StepContext {
        engine: ctx.engine,
        step: ctx.step,
        sudo_password: ctx.sudo_password,
        env,
    };
    match verify_ctx.run_raw(&argv, false, None) {
        Ok(result) => {
            let mut outcome = StepOutcome::from_command(&result, format!("{} works", binary));
            outcome.path = Some(resolved);
            outcome
        }
        Err(e) => StepOutcome::fail(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{argv, engine};
    use crate::steps::{Step, StepAction};
    use tempfile::TempDir;

    #[test]
    fn reads_dirs_from_post_env() {
        let dirs = post_env_dirs(
            "export PATH=\"$HOME/.cargo/bin:/opt/tool/bin:$PATH\"",
            Path::new("/home/ada"),
        );
        assert_eq!(
            dirs,
            vec![PathBuf::from("/home/ada/.cargo/bin"), PathBuf::from("/opt/tool/bin")]
        );
        assert!(post_env_dirs("export GOPATH=$HOME/go", Path::new("/h")).is_empty());
    }

    #[test]
    fn missing_binary_asks_for_new_shell() {
        let dir = TempDir::new().unwrap();
        let step = Step::new(
            "Verify",
            StepAction::Verify {
                command: argv(&["rigup-definitely-missing-binary", "--version"]),
            },
        );
        let outcome = engine(&dir).execute_step(&step, None, None);
        assert!(!outcome.ok);
        assert!(outcome.needs_shell_restart);
    }

    #[cfg(unix)]
    #[test]
    fn finds_binary_through_post_env() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let bin = dir.path().join("toolbin");
        std::fs::create_dir(&bin).unwrap();
        let tool = bin.join("rigup-demo-tool");
        std::fs::write(&tool, "#!/bin/sh\necho demo 1.2.3\n").unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();

        let step = Step::new(
            "Verify demo",
            StepAction::Verify {
                command: argv(&["rigup-demo-tool", "--version"]),
            },
        )
        .with_post_env(Some(format!("export PATH=\"{}:$PATH\"", bin.display())));
        let outcome = engine(&dir).execute_step(&step, None, None);
        assert!(outcome.ok, "{:?}", outcome.error);
        assert!(outcome.stdout.contains("1.2.3"));
        assert_eq!(outcome.path, Some(tool));
    }
}
