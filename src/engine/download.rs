//! Artifact downloads.
//!
//! Downloads stream into `<name>.part` next to the destination (or into a
//! staging directory when the destination needs root), resume from an
//! existing partial file when the server honors `Range`, and are renamed
//! into place only after the checksum matches.

use anyhow::{bail, Context};
use chrono::Utc;
use reqwest::blocking::RequestBuilder;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{sha256_file, StepContext};
use crate::steps::{AuthKind, DownloadAuth, DownloadStep, StepOutcome};

/// Free space required relative to the declared size, in tenths.
const SPACE_FACTOR_TENTHS: u64 = 12;

/// Progress is logged every this many percent.
const PROGRESS_STEP: u64 = 5;

/// Bytes required on disk for a download of `size` bytes.
pub fn required_space(size: u64) -> u64 {
    size.saturating_mul(SPACE_FACTOR_TENTHS) / 10
}

/// Attach credentials. Returns a warning when a token was expected but
/// could not be found.
pub fn apply_auth(
    request: RequestBuilder,
    auth: Option<&DownloadAuth>,
) -> (RequestBuilder, Option<String>) {
    let Some(auth) = auth else {
        return (request, None);
    };
    let token = auth.token.clone().or_else(|| {
        auth.auth_env_var
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|t| !t.is_empty())
    });
    let Some(token) = token else {
        let source = auth.auth_env_var.as_deref().unwrap_or("token");
        return (
            request,
            Some(format!("No credentials found in {}; downloading anonymously", source)),
        );
    };
    let request = match auth.kind {
        AuthKind::Bearer => request.bearer_auth(token),
        AuthKind::Basic => {
            request.basic_auth(auth.username.as_deref().unwrap_or_default(), Some(token))
        }
        AuthKind::Header => {
            let name = auth.header_name.as_deref().unwrap_or("Authorization");
            request.header(name, token)
        }
    };
    (request, None)
}

fn existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| p.exists())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"))
}

fn file_name(dest: &Path) -> String {
    dest.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string())
}

/// Stream `step.url` into `part`, resuming when possible. Returns the final size.
fn fetch(ctx: &StepContext<'_>, step: &DownloadStep, part: &Path) -> anyhow::Result<(u64, Option<String>)> {
    let offset = fs::metadata(part).map(|m| m.len()).unwrap_or(0);
    let mut request = ctx.engine.client().get(&step.url);
    if offset > 0 {
        debug!("Resuming {} from byte {}", step.url, offset);
        request = request.header(RANGE, format!("bytes={}-", offset));
    }
    let (request, auth_warning) = apply_auth(request, step.auth.as_ref());
    let mut response = request
        .send()
        .with_context(|| format!("requesting {}", step.url))?;
    let status = response.status();

    if offset > 0 && status == StatusCode::RANGE_NOT_SATISFIABLE {
        debug!("{} already complete", part.display());
        return Ok((offset, auth_warning));
    }
    if !status.is_success() {
        bail!("HTTP {} from {}", status, step.url);
    }

    let (mut file, start) = if offset > 0 && status == StatusCode::PARTIAL_CONTENT {
        (OpenOptions::new().append(true).open(part)?, offset)
    } else {
        (File::create(part)?, 0)
    };
    let total = response
        .content_length()
        .map(|len| len + start)
        .or(step.size_bytes);

    let mut written = start;
    let mut last_bucket = total.map(|t| percent(written, t) / PROGRESS_STEP);
    let mut buf = vec![0u8; 256 * 1024];
    loop {
        let n = response.read(&mut buf).context("reading response body")?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])?;
        written += n as u64;
        if let (Some(total), Some(last)) = (total, last_bucket.as_mut()) {
            let bucket = percent(written, total) / PROGRESS_STEP;
            if bucket > *last {
                *last = bucket;
                info!(
                    "{}: {}% ({} / {} bytes)",
                    ctx.step.label,
                    bucket * PROGRESS_STEP,
                    written,
                    total
                );
            }
        }
    }
    file.flush()?;
    Ok((written, auth_warning))
}

fn percent(done: u64, total: u64) -> u64 {
    if total == 0 {
        100
    } else {
        (done.saturating_mul(100) / total).min(100)
    }
}

/// Run a download step.
pub(crate) fn run(ctx: &StepContext<'_>, step: &DownloadStep) -> StepOutcome {
    let dest = PathBuf::from(&step.dest);
    let privileged = ctx.use_sudo(ctx.step.needs_sudo);
    let staging = if privileged {
        std::env::temp_dir().join("rigup-downloads")
    } else {
        dest.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."))
    };

    if let Some(size) = step.size_bytes {
        let probe = existing_ancestor(&staging);
        match ctx.engine.free_space(&probe) {
            Ok(free) if free < required_space(size) => {
                return StepOutcome::fail(format!(
                    "Not enough disk space at {}: need {} MB, {} MB free",
                    probe.display(),
                    required_space(size) / 1_000_000,
                    free / 1_000_000
                ));
            }
            Ok(_) => {}
            Err(e) => warn!("Could not check free space at {}: {}", probe.display(), e),
        }
    }

    if let Err(e) = fs::create_dir_all(&staging) {
        return StepOutcome::fail(format!("Cannot create {}: {}", staging.display(), e));
    }
    let part = staging.join(format!("{}.part", file_name(&dest)));

    let (size, auth_warning) = match fetch(ctx, step, &part) {
        Ok(r) => r,
        Err(e) => return StepOutcome::fail(format!("Download failed: {:#}", e)),
    };

    if let Some(expected) = &step.sha256 {
        match sha256_file(&part) {
            Ok(actual) if actual.eq_ignore_ascii_case(expected) => debug!("Checksum verified"),
            Ok(actual) => {
                let _ = fs::remove_file(&part);
                return StepOutcome::fail(format!(
                    "Checksum mismatch for {}: expected {}, got {}; file deleted",
                    step.url, expected, actual
                ));
            }
            Err(e) => {
                let _ = fs::remove_file(&part);
                return StepOutcome::fail(format!("Cannot hash {}: {}", part.display(), e));
            }
        }
    }

    if let Err(e) = place(ctx, &part, &dest, privileged) {
        return StepOutcome::fail(format!("Cannot move download into place: {:#}", e));
    }

    let mut outcome = StepOutcome::ok(format!("Downloaded {} ({} bytes)", dest.display(), size))
        .with_path(dest);
    if let Some(w) = auth_warning {
        outcome = outcome.with_warning(w);
    }
    if let Some(id) = &step.data_pack_id {
        if let Err(e) = ctx.engine.freshness().record(id, Utc::now()) {
            outcome = outcome.with_warning(format!("Could not record freshness for {}: {:#}", id, e));
        }
    }
    outcome
}

fn place(ctx: &StepContext<'_>, part: &Path, dest: &Path, privileged: bool) -> anyhow::Result<()> {
    if !privileged {
        fs::rename(part, dest)
            .with_context(|| format!("renaming {} to {}", part.display(), dest.display()))?;
        return Ok(());
    }
    let parent = dest.parent().unwrap_or_else(|| Path::new("/"));
    let commands = [
        vec!["mkdir".to_string(), "-p".to_string(), parent.display().to_string()],
        vec![
            "mv".to_string(),
            part.display().to_string(),
            dest.display().to_string(),
        ],
    ];
    for argv in &commands {
        let result = ctx.run_raw(argv, true, None)?;
        if !result.success {
            bail!(result.error_message());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::engine;
    use crate::engine::{check_freshness, Freshness};
    use crate::steps::{Step, StepAction};
    use httpmock::prelude::*;
    use tempfile::TempDir;

    fn step(url: String, dest: &Path) -> DownloadStep {
        DownloadStep {
            url,
            dest: dest.display().to_string(),
            size_bytes: None,
            sha256: None,
            auth: None,
            data_pack_id: None,
        }
    }

    fn as_step(download: DownloadStep) -> Step {
        Step::new("Download artifact", StepAction::Download(download))
    }

    #[test]
    fn space_factor() {
        assert_eq!(required_space(100), 120);
        assert_eq!(percent(50, 200), 25);
        assert_eq!(percent(1, 0), 100);
    }

    #[test]
    fn insufficient_space_fails_before_writing() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("models/big.bin");
        let mut download = step("http://127.0.0.1:9/never".into(), &dest);
        download.size_bytes = Some(150_000_000);

        let engine = engine(&dir).with_free_space(|_| Ok(100_000_000));
        let outcome = engine.execute_step(&as_step(download), None, None);
        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().contains("Not enough disk space"));
        assert!(!dest.exists());
        assert!(!dir.path().join("models/big.bin.part").exists());
    }

    #[test]
    fn downloads_verifies_and_stamps() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/pack.bin");
            then.status(200).body("payload");
        });
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out/pack.bin");
        let mut download = step(server.url("/pack.bin"), &dest);
        download.sha256 =
            Some("239f59ed55e737c77147cf55ad0c1b030b6d7ee748a7426952f9b852d5a935e5".into());
        download.data_pack_id = Some("demo-pack".into());
        download.size_bytes = Some(7);

        let engine = engine(&dir).with_free_space(|_| Ok(u64::MAX));
        let outcome = engine.execute_step(&as_step(download), None, None);
        assert!(outcome.ok, "{:?}", outcome.error);
        assert_eq!(fs::read_to_string(&dest).unwrap(), "payload");

        let report = check_freshness(
            &engine.freshness(),
            "demo-pack",
            chrono::Duration::days(1),
            Utc::now(),
        );
        assert_eq!(report.status, Freshness::Fresh);
    }

    #[test]
    fn checksum_mismatch_deletes_file() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/pack.bin");
            then.status(200).body("tampered");
        });
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("pack.bin");
        let mut download = step(server.url("/pack.bin"), &dest);
        download.sha256 = Some("ab".repeat(32));

        let outcome = engine(&dir).execute_step(&as_step(download), None, None);
        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().contains("Checksum mismatch"));
        assert!(!dest.exists());
        assert!(!dir.path().join("pack.bin.part").exists());
    }

    #[test]
    fn resumes_partial_download_with_range() {
        let server = MockServer::start();
        let ranged = server.mock(|when, then| {
            when.method(GET).path("/pack.bin").header("range", "bytes=5-");
            then.status(206).body(" world");
        });
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("pack.bin");
        fs::write(dir.path().join("pack.bin.part"), "hello").unwrap();

        let outcome = engine(&dir).execute_step(&as_step(step(server.url("/pack.bin"), &dest)), None, None);
        assert!(outcome.ok, "{:?}", outcome.error);
        ranged.assert();
        assert_eq!(fs::read_to_string(&dest).unwrap(), "hello world");
    }

    #[test]
    fn bearer_token_from_env_var() {
        let server = MockServer::start();
        let authed = server.mock(|when, then| {
            when.method(GET)
                .path("/private.bin")
                .header("authorization", "Bearer s3cret");
            then.status(200).body("ok");
        });
        std::env::set_var("RIGUP_TEST_DOWNLOAD_TOKEN", "s3cret");
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("private.bin");
        let mut download = step(server.url("/private.bin"), &dest);
        download.auth = Some(DownloadAuth {
            kind: AuthKind::Bearer,
            token: None,
            auth_env_var: Some("RIGUP_TEST_DOWNLOAD_TOKEN".into()),
            header_name: None,
            username: None,
        });

        let outcome = engine(&dir).execute_step(&as_step(download), None, None);
        assert!(outcome.ok, "{:?}", outcome.error);
        authed.assert();
    }

    #[test]
    fn http_error_is_a_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/gone");
            then.status(404);
        });
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("gone");
        let outcome = engine(&dir).execute_step(&as_step(step(server.url("/gone"), &dest)), None, None);
        assert!(!outcome.ok);
        assert!(outcome.error.unwrap().contains("404"));
    }
}
