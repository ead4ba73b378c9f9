//! Integration tests for the `rigup` binary.
// The cargo_bin function is marked deprecated in favor of cargo_bin! macro,
// but both work correctly. Suppressing until assert_cmd stabilizes the new API.
#![allow(deprecated)]

use assert_cmd::cargo::cargo_bin;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const CATALOG: &str = r#"
hello:
  label: Hello
  cli: rigup-test-hello-absent
  install:
    _default: [sh, -c, "echo installing hello"]
  needs_sudo:
    _default: false

grumpy:
  label: Grumpy
  cli: rigup-test-grumpy-absent
  install:
    _default: [sh, -c, "echo 'grumpy: disk quota exceeded' >&2; exit 3"]
  needs_sudo:
    _default: false
  on_failure:
    - pattern: "disk quota exceeded"
      category: resources
      label: Out of quota
      options:
        - id: free-space
          label: Free some space
          strategy: manual
          instructions: Delete old build artifacts.

rooty:
  label: Rooty
  cli: rigup-test-rooty-absent
  install:
    _default: [sh, -c, "echo rooty"]
  needs_sudo:
    _default: true
"#;

const PROFILE: &str = r#"{
  "system": "linux",
  "package_manager": {"primary": "apt"},
  "distro": {"family": "debian", "id": "debian"},
  "capabilities": {"has_sudo": true, "has_systemd": true, "is_root": false},
  "hardware": {"arch": "amd64", "cpu_cores": 2}
}"#;

struct Fixture {
    _dir: TempDir,
    catalog: PathBuf,
    profile: PathBuf,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let catalog = dir.path().join("recipes.yml");
    let profile = dir.path().join("profile.json");
    fs::write(&catalog, CATALOG).unwrap();
    fs::write(&profile, PROFILE).unwrap();
    Fixture {
        _dir: dir,
        catalog,
        profile,
    }
}

fn rigup(f: &Fixture) -> Command {
    let mut cmd = Command::new(cargo_bin("rigup"));
    cmd.arg("--catalog").arg(&f.catalog).env_remove("RIGUP_SUDO_PASSWORD");
    cmd
}

#[test]
fn cli_shows_help() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("rigup"));
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_DESCRIPTION")))
        .stdout(predicate::str::contains("validate"));
    Ok(())
}

#[test]
fn cli_shows_version() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("rigup"));
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[test]
fn validate_embedded_catalog() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("rigup"));
    cmd.arg("validate");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("recipes OK"));
    Ok(())
}

#[test]
fn validate_reports_broken_file() -> Result<(), Box<dyn std::error::Error>> {
    let dir = TempDir::new()?;
    let file = dir.path().join("broken.yml");
    fs::write(&file, "broken:\n  description: no label or install\n")?;
    let mut cmd = Command::new(cargo_bin("rigup"));
    cmd.arg("validate").arg(&file);
    cmd.assert()
        .code(1)
        .stdout(predicate::str::contains("broken: Missing required field: label"));
    Ok(())
}

#[test]
fn plan_prints_json() -> Result<(), Box<dyn std::error::Error>> {
    let f = fixture();
    let output = rigup(&f)
        .args(["plan", "hello", "--profile"])
        .arg(&f.profile)
        .output()?;
    assert!(output.status.success());
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(plan["tool"], "hello");
    assert_eq!(plan["confirmation_gate"]["level"], "none");
    assert_eq!(plan["steps"][0]["type"], "tool");
    Ok(())
}

#[test]
fn plan_for_unknown_tool_is_json_error() -> Result<(), Box<dyn std::error::Error>> {
    let f = fixture();
    rigup(&f)
        .args(["plan", "nope", "--profile"])
        .arg(&f.profile)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("\"tool\": \"nope\""));
    Ok(())
}

#[test]
fn plan_reads_profile_from_stdin() -> Result<(), Box<dyn std::error::Error>> {
    let f = fixture();
    rigup(&f)
        .args(["plan", "hello", "--profile", "-"])
        .write_stdin(PROFILE)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"tool\": \"hello\""));
    Ok(())
}

#[test]
fn bad_profile_exits_with_error() -> Result<(), Box<dyn std::error::Error>> {
    let f = fixture();
    rigup(&f)
        .args(["plan", "hello", "--profile", "-"])
        .write_stdin("{not json")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to parse"));
    Ok(())
}

#[test]
fn choices_prints_resolution() -> Result<(), Box<dyn std::error::Error>> {
    let f = fixture();
    rigup(&f)
        .args(["choices", "hello", "--profile"])
        .arg(&f.profile)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"auto_resolve\": false"));
    Ok(())
}

#[test]
fn run_executes_plan() -> Result<(), Box<dyn std::error::Error>> {
    let f = fixture();
    let output = rigup(&f)
        .args(["run", "hello", "--profile"])
        .arg(&f.profile)
        .output()?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["outcome"]["ok"], true);
    assert!(report["outcome"]["steps"][0]["stdout"]
        .as_str()
        .unwrap()
        .contains("installing hello"));
    Ok(())
}

#[test]
fn run_refuses_unconfirmed_sudo_plan() -> Result<(), Box<dyn std::error::Error>> {
    let f = fixture();
    rigup(&f)
        .args(["run", "rooty", "--profile"])
        .arg(&f.profile)
        .assert()
        .code(3)
        .stdout(predicate::str::contains("--yes"));
    Ok(())
}

#[test]
fn run_failure_offers_remediation() -> Result<(), Box<dyn std::error::Error>> {
    let f = fixture();
    let output = rigup(&f)
        .args(["run", "grumpy", "--profile"])
        .arg(&f.profile)
        .output()?;
    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["outcome"]["ok"], false);
    assert_eq!(report["outcome"]["failed_step"], 0);
    assert_eq!(report["outcome"]["remediation"][0]["id"], "free-space");
    Ok(())
}

#[test]
fn schema_prints_json_schema() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin("rigup"));
    cmd.arg("schema");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("rigup recipe catalog"));
    Ok(())
}
