//! Config-file steps.
//!
//! Plain writes, appends and idempotent line insertion, plus the template
//! pipeline: fill defaults, validate inputs, render, reject unresolved
//! placeholders, check the declared format, then write.

use anyhow::{bail, Context};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::debug;

use super::{backup, StepContext};
use crate::recipe::{ConfigFormat, InputSpec};
use crate::resolver::apply::{placeholders, substitute, validate_input, value_text};
use crate::steps::{ConfigAction, ConfigStep, StepOutcome};

/// Render a template against its inputs and supplied values.
pub fn render_template(
    template: &str,
    inputs: &[InputSpec],
    values: &BTreeMap<String, serde_json::Value>,
    format: ConfigFormat,
) -> Result<String, String> {
    let mut text = BTreeMap::new();
    for input in inputs {
        let value = values
            .get(&input.id)
            .or(input.default.as_ref())
            .map(value_text);
        let Some(value) = value else {
            return Err(format!("No value for input '{}'", input.id));
        };
        validate_input(input, &value)?;
        text.insert(input.id.clone(), value);
    }
    for (key, value) in values {
        text.entry(key.clone()).or_insert_with(|| value_text(value));
    }

    let rendered = substitute(template, &text);
    let unresolved = placeholders(&rendered);
    if !unresolved.is_empty() {
        return Err(format!(
            "Unresolved placeholders: {}",
            unresolved
                .iter()
                .map(|p| format!("{{{}}}", p))
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    check_format(&rendered, format)?;
    Ok(rendered)
}

/// Check rendered content against its declared format.
pub fn check_format(content: &str, format: ConfigFormat) -> Result<(), String> {
    match format {
        ConfigFormat::Raw => Ok(()),
        ConfigFormat::Json => serde_json::from_str::<serde_json::Value>(content)
            .map(drop)
            .map_err(|e| format!("Rendered content is not valid JSON: {}", e)),
        ConfigFormat::Yaml => serde_yaml::from_str::<serde_yaml::Value>(content)
            .map(drop)
            .map_err(|e| format!("Rendered content is not valid YAML: {}", e)),
        ConfigFormat::Ini => check_lines(content, "INI", |line| {
            (line.starts_with('[') && line.ends_with(']')) || line.contains('=')
        }),
        ConfigFormat::Env => check_lines(content, "env", |line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            line.split_once('=').is_some_and(|(key, _)| {
                !key.is_empty()
                    && !key.starts_with(|c: char| c.is_ascii_digit())
                    && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            })
        }),
    }
}

fn check_lines(content: &str, name: &str, valid: impl Fn(&str) -> bool) -> Result<(), String> {
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if !valid(line) {
            return Err(format!("Line {} is not valid {}: {}", n + 1, name, line));
        }
    }
    Ok(())
}

/// Apply a config step.
pub(crate) fn apply(ctx: &StepContext<'_>, config: &ConfigStep) -> StepOutcome {
    let path = Path::new(&config.path);
    let privileged = ctx.use_sudo(ctx.step.needs_sudo);

    let (content, append) = match &config.action {
        ConfigAction::Write { content } => (content.clone(), false),
        ConfigAction::Append { content } => (content.clone(), true),
        ConfigAction::EnsureLine { line } => {
            if line_present(ctx, path, line, privileged) {
                return StepOutcome::skipped(format!("{} already contains the line", config.path));
            }
            (format!("{}{}\n", leading_newline(path), line), true)
        }
        ConfigAction::Template {
            template,
            inputs,
            values,
            format,
        } => match render_template(template, inputs, values, *format) {
            Ok(rendered) => (rendered, false),
            Err(e) => return StepOutcome::fail(e),
        },
    };

    let mut outcome = StepOutcome::ok(format!("Updated {}", config.path)).with_path(path.to_path_buf());
    let backed_up_by_step = ctx.step.backup_before.iter().any(|t| Path::new(t) == path);
    if !backed_up_by_step {
        match backup::backup_path(ctx, path) {
            Ok(b) => outcome.backup = b,
            Err(e) => outcome = outcome.with_warning(format!("Could not back up {}: {}", config.path, e)),
        }
    }

    if let Err(e) = write(ctx, path, &content, append, privileged) {
        return StepOutcome::fail(format!("Cannot write {}: {:#}", config.path, e));
    }
    if let Some(mode) = &config.mode {
        if let Err(e) = set_mode(ctx, path, mode, privileged) {
            return StepOutcome::fail(format!("Cannot set mode {} on {}: {:#}", mode, config.path, e));
        }
    }
    if let Some(owner) = &config.owner {
        let argv = vec!["chown".to_string(), owner.clone(), config.path.clone()];
        match ctx.run_raw(&argv, true, None) {
            Ok(r) if r.success => {}
            Ok(r) => return StepOutcome::fail(format!("chown {} failed: {}", owner, r.error_message())),
            Err(e) => return StepOutcome::fail(e.to_string()),
        }
    }
    if let Some(command) = &config.post_command {
        let post = ctx.run_outcome(command, ctx.step.needs_sudo, None, "post command done");
        if !post.ok {
            return StepOutcome {
                error: Some(format!(
                    "Wrote {} but the post command failed: {}",
                    config.path,
                    post.error.as_deref().unwrap_or("unknown error")
                )),
                ..post
            };
        }
        outcome.stdout = post.stdout;
    }
    outcome
}

fn line_present(ctx: &StepContext<'_>, path: &Path, line: &str, privileged: bool) -> bool {
    match fs::read_to_string(path) {
        Ok(content) => content.lines().any(|l| l.trim_end() == line),
        Err(_) if privileged && path.exists() => {
            let argv = vec![
                "grep".to_string(),
                "-qxF".to_string(),
                line.to_string(),
                path.display().to_string(),
            ];
            ctx.run_raw(&argv, true, None).is_ok_and(|r| r.success)
        }
        Err(_) => false,
    }
}

/// A newline when the file exists and does not end with one.
fn leading_newline(path: &Path) -> &'static str {
    match fs::read(path) {
        Ok(bytes) if !bytes.is_empty() && !bytes.ends_with(b"\n") => "\n",
        _ => "",
    }
}

fn write(ctx: &StepContext<'_>, path: &Path, content: &str, append: bool, privileged: bool) -> anyhow::Result<()> {
    if privileged {
        let redirect = if append { ">>" } else { ">" };
        let argv = vec![
            "sh".to_string(),
            "-c".to_string(),
            format!("mkdir -p \"$(dirname \"$2\")\" && printf %s \"$1\" {} \"$2\"", redirect),
            "sh".to_string(),
            content.to_string(),
            path.display().to_string(),
        ];
        let result = ctx.run_raw(&argv, true, None)?;
        if !result.success {
            bail!(result.error_message());
        }
        return Ok(());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    if append {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(content.as_bytes())?;
    } else {
        fs::write(path, content)?;
    }
    debug!("Wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

fn set_mode(ctx: &StepContext<'_>, path: &Path, mode: &str, privileged: bool) -> anyhow::Result<()> {
    let digits = mode.trim_start_matches("0o");
    let bits = u32::from_str_radix(digits, 8).with_context(|| format!("invalid mode '{}'", mode))?;
    if privileged {
        let argv = vec!["chmod".to_string(), format!("{:o}", bits), path.display().to_string()];
        let result = ctx.run_raw(&argv, true, None)?;
        if !result.success {
            bail!(result.error_message());
        }
        return Ok(());
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(bits))?;
    }
    #[cfg(not(unix))]
    let _ = bits;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::engine;
    use crate::recipe::InputKind;
    use crate::steps::{Step, StepAction};
    use serde_json::json;
    use tempfile::TempDir;

    fn config_step(path: &Path, action: ConfigAction) -> Step {
        Step::new(
            "Configure",
            StepAction::Config(ConfigStep {
                path: path.display().to_string(),
                action,
                mode: None,
                owner: None,
                post_command: None,
            }),
        )
    }

    fn port_input() -> InputSpec {
        InputSpec {
            id: "port".into(),
            label: "Port".into(),
            kind: InputKind::Number,
            default: Some(json!(8080)),
            min: Some(1.0),
            max: Some(65535.0),
            ..Default::default()
        }
    }

    #[test]
    fn template_uses_defaults_and_values() {
        let inputs = vec![port_input()];
        let rendered = render_template(
            "{\"port\": {port}}",
            &inputs,
            &BTreeMap::new(),
            ConfigFormat::Json,
        )
        .unwrap();
        assert_eq!(rendered, "{\"port\": 8080}");

        let values = BTreeMap::from([("port".to_string(), json!("9000"))]);
        let rendered = render_template("PORT={port}", &inputs, &values, ConfigFormat::Env).unwrap();
        assert_eq!(rendered, "PORT=9000");
    }

    #[test]
    fn template_rejects_invalid_input() {
        let values = BTreeMap::from([("port".to_string(), json!("70000"))]);
        let err = render_template("PORT={port}", &[port_input()], &values, ConfigFormat::Env)
            .unwrap_err();
        assert!(err.contains("at most"));
    }

    #[test]
    fn template_rejects_unresolved_placeholder() {
        let err = render_template("host={host}", &[], &BTreeMap::new(), ConfigFormat::Raw).unwrap_err();
        assert_eq!(err, "Unresolved placeholders: {host}");
    }

    #[test]
    fn template_rejects_bad_format() {
        let err = render_template("{not json", &[], &BTreeMap::new(), ConfigFormat::Json).unwrap_err();
        assert!(err.contains("JSON"));
        assert!(check_format("[server]\nport = 1\n; note", ConfigFormat::Ini).is_ok());
        assert!(check_format("just words", ConfigFormat::Ini).is_err());
        assert!(check_format("export A_1=x\nB=2", ConfigFormat::Env).is_ok());
        assert!(check_format("1A=x", ConfigFormat::Env).is_err());
        assert!(check_format("a: [1, 2", ConfigFormat::Yaml).is_err());
    }

    #[test]
    fn ensure_line_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sysctl.conf");
        fs::write(&path, "vm.swappiness=10").unwrap();
        let step = config_step(
            &path,
            ConfigAction::EnsureLine {
                line: "net.ipv4.ip_forward=1".into(),
            },
        );
        let engine = engine(&dir);

        let first = engine.execute_step(&step, None, None);
        assert!(first.ok && !first.skipped);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "vm.swappiness=10\nnet.ipv4.ip_forward=1\n"
        );

        let second = engine.execute_step(&step, None, None);
        assert!(second.skipped);
        assert_eq!(
            fs::read_to_string(&path).unwrap().matches("ip_forward").count(),
            1
        );
    }

    #[test]
    fn append_and_ensure_line_back_up_existing_file() {
        let dir = TempDir::new().unwrap();
        let appended = dir.path().join("append.conf");
        let ensured = dir.path().join("ensure.conf");
        fs::write(&appended, "a\n").unwrap();
        fs::write(&ensured, "a\n").unwrap();
        let engine = engine(&dir);

        let outcome = engine.execute_step(
            &config_step(&appended, ConfigAction::Append { content: "b\n".into() }),
            None,
            None,
        );
        assert!(outcome.ok, "{:?}", outcome.error);
        assert_eq!(fs::read_to_string(&appended).unwrap(), "a\nb\n");
        assert_eq!(fs::read_to_string(outcome.backup.unwrap()).unwrap(), "a\n");

        let outcome = engine.execute_step(
            &config_step(&ensured, ConfigAction::EnsureLine { line: "c".into() }),
            None,
            None,
        );
        assert!(outcome.ok, "{:?}", outcome.error);
        assert_eq!(fs::read_to_string(&ensured).unwrap(), "a\nc\n");
        assert_eq!(fs::read_to_string(outcome.backup.unwrap()).unwrap(), "a\n");
    }

    #[test]
    fn ensure_line_already_present_takes_no_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("present.conf");
        fs::write(&path, "c\n").unwrap();

        let outcome = engine(&dir).execute_step(
            &config_step(&path, ConfigAction::EnsureLine { line: "c".into() }),
            None,
            None,
        );
        assert!(outcome.skipped);
        assert!(outcome.backup.is_none());
        let backups = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("rigup-backup"))
            .count();
        assert_eq!(backups, 0);
    }

    #[test]
    fn write_backs_up_existing_file_and_sets_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("etc/app.conf");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "old").unwrap();
        let mut step = config_step(&path, ConfigAction::Write { content: "new".into() });
        if let StepAction::Config(c) = &mut step.action {
            c.mode = Some("0600".into());
        }

        let outcome = engine(&dir).execute_step(&step, None, None);
        assert!(outcome.ok, "{:?}", outcome.error);
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        let backup = outcome.backup.unwrap();
        assert_eq!(fs::read_to_string(backup).unwrap(), "old");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn template_step_writes_rendered_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.env");
        let step = config_step(
            &path,
            ConfigAction::Template {
                template: "PORT={port}\n".into(),
                inputs: vec![port_input()],
                values: BTreeMap::new(),
                format: ConfigFormat::Env,
            },
        );
        let outcome = engine(&dir).execute_step(&step, None, None);
        assert!(outcome.ok, "{:?}", outcome.error);
        assert_eq!(fs::read_to_string(&path).unwrap(), "PORT=8080\n");
    }

    #[test]
    fn failed_template_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.json");
        let step = config_step(
            &path,
            ConfigAction::Template {
                template: "{\"x\": {missing}}".into(),
                inputs: vec![],
                values: BTreeMap::new(),
                format: ConfigFormat::Json,
            },
        );
        let outcome = engine(&dir).execute_step(&step, None, None);
        assert!(!outcome.ok);
        assert!(!path.exists());
    }
}
