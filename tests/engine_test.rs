//! Integration tests for the step execution engine.

mod common;

use flate2::write::GzEncoder;
use flate2::Compression;
use httpmock::prelude::*;
use rigup::engine::{rollback_steps, Engine, EngineOptions};
use rigup::recipe::RecipeBase;
use rigup::remediation::RecipeHandlers;
use rigup::resolver::Plan;
use rigup::steps::{DownloadStep, ReleaseStep, Step, StepAction};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn root_engine(dir: &TempDir) -> Engine {
    let mut profile = common::debian();
    profile.capabilities.is_root = true;
    Engine::new(profile).with_options(EngineOptions {
        state_dir: dir.path().join("state"),
        home: dir.path().join("home"),
        ..EngineOptions::default()
    })
}

fn plan(tool: &str, method: Option<&str>, steps: Vec<Step>) -> Plan {
    let base = RecipeBase {
        label: tool.into(),
        ..Default::default()
    };
    let mut plan = Plan::from_steps(tool, &base, "tool", steps);
    plan.method = method.map(String::from);
    plan
}

#[test]
fn large_download_on_a_full_disk_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let engine = root_engine(&dir).with_free_space(|_| Ok(99 * 1024 * 1024));
    let dest = dir.path().join("models").join("weights.bin");
    let step = Step::new(
        "Download weights",
        StepAction::Download(DownloadStep {
            url: "http://127.0.0.1:9/never-fetched".into(),
            dest: dest.display().to_string(),
            size_bytes: Some(150 * 1024 * 1024),
            sha256: None,
            auth: None,
            data_pack_id: None,
        }),
    );

    let outcome = engine.execute_step(&step, None, None);
    assert!(!outcome.ok);
    assert!(outcome.error.unwrap().contains("disk space"));
    assert!(!dest.exists());
    assert!(!dest.with_extension("bin.part").exists());
}

fn tarball(name: &str, script: &str) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.set_size(script.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder
        .append_data(&mut header, format!("dist/{}", name), script.as_bytes())
        .unwrap();
    builder.into_inner().unwrap().finish().unwrap()
}

#[test]
fn release_plan_installs_verifies_and_rolls_back() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/repos/acme/gizmo/releases/latest");
        then.status(200).json_body(json!({
            "tag_name": "v0.9.0",
            "assets": [
                {"name": "gizmo-x86_64-unknown-linux-musl.tar.gz",
                 "browser_download_url": server.url("/dl/gizmo.tar.gz")},
                {"name": "gizmo-x86_64-unknown-linux-musl.tar.gz.sha256",
                 "browser_download_url": server.url("/dl/gizmo.sha256")}
            ]
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/dl/gizmo.tar.gz");
        then.status(200).body(tarball("gizmo", "#!/bin/sh\necho gizmo 0.9.0\n"));
    });

    let dir = TempDir::new().unwrap();
    let bin = dir.path().join("bin");
    let engine = root_engine(&dir).with_options(EngineOptions {
        github_api: server.base_url(),
        state_dir: dir.path().join("state"),
        home: dir.path().join("home"),
        ..EngineOptions::default()
    });
    let installed = bin.join("gizmo");
    let plan = plan(
        "gizmo",
        Some("binary"),
        vec![
            Step::new(
                "Install gizmo",
                StepAction::GithubRelease(ReleaseStep {
                    repo: "acme/gizmo".into(),
                    version: None,
                    asset_pattern: r"gizmo-{arch}-.*-{os}-musl\.tar\.gz$".into(),
                    binary: Some("gizmo".into()),
                    install_dir: Some(bin.display().to_string()),
                    sha256: None,
                }),
            ),
            Step::new(
                "Verify gizmo",
                StepAction::Verify {
                    command: vec![installed.display().to_string()],
                },
            ),
            Step::new(
                "Fail on purpose",
                StepAction::Tool {
                    command: vec!["false".into()],
                    script_sha256: None,
                    cwd: None,
                },
            ),
        ],
    );

    let outcome = engine.execute_plan(&plan, None);
    assert!(!outcome.ok);
    assert_eq!(outcome.failed_step, Some(2));
    assert!(outcome.steps[1].stdout.contains("gizmo 0.9.0"));
    assert!(installed.exists());

    let undo = rollback_steps(&plan, &outcome);
    assert_eq!(undo.len(), 1);
    let report = engine.execute_rollback(&undo, None);
    assert!(report.ok, "{:?}", report.errors);
    assert_eq!(report.steps_run, 1);
    assert!(!installed.exists());
}

#[test]
fn failures_carry_recipe_remediation() {
    let dir = TempDir::new().unwrap();
    let catalog = common::catalog();
    let engine = root_engine(&dir).with_remediation(Box::new(RecipeHandlers::new(catalog)));
    let failing = Step::new(
        "Install cargo-outdated",
        StepAction::Tool {
            command: vec![
                "sh".into(),
                "-c".into(),
                "echo 'error: failed to run custom build command for `openssl-sys v0.9.102`' >&2; exit 101"
                    .into(),
            ],
            script_sha256: None,
            cwd: None,
        },
    )
    .with_tool("cargo-outdated");
    let plan = plan("cargo-outdated", Some("cargo"), vec![failing]);

    let outcome = engine.execute_plan(&plan, None);
    assert!(!outcome.ok);
    assert_eq!(outcome.steps[0].exit_code, Some(101));
    let recommended = outcome
        .remediation
        .iter()
        .find(|o| o.recommended)
        .expect("a recommended option");
    assert_eq!(recommended.id, "ssl-headers");
    assert!(recommended.available);
}
