//! GitHub release installs.
//!
//! Looks up a release, picks the asset whose name matches the step's
//! pattern for this machine, unpacks it in a temp directory and copies the
//! binary into the first usable install directory.

use anyhow::{anyhow, bail, Context};
use flate2::read::GzDecoder;
use regex::Regex;
use serde::Deserialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

use super::{sha256_file, StepContext};
use crate::profile::is_executable;
use crate::steps::{ReleaseStep, StepOutcome};

const SYSTEM_BIN: &str = "/usr/local/bin";

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAssets {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

fn arch_alternation(arch: &str) -> String {
    match arch {
        "x86_64" | "amd64" => "(?:x86_64|amd64)".to_string(),
        "aarch64" | "arm64" => "(?:aarch64|arm64)".to_string(),
        "armv7l" | "armhf" => "(?:armv7l?|armhf)".to_string(),
        other => regex::escape(other),
    }
}

fn os_alternation(system: &str) -> String {
    match system.to_lowercase().as_str() {
        "linux" | "" => "(?i:linux)".to_string(),
        "darwin" | "macos" => "(?i:darwin|macos|apple)".to_string(),
        other => format!("(?i:{})", regex::escape(other)),
    }
}

/// Compile an asset pattern, expanding `{arch}` and `{os}` first.
pub fn asset_regex(pattern: &str, arch: &str, system: &str) -> Result<Regex, regex::Error> {
    let expanded = pattern
        .replace("{arch}", &arch_alternation(arch))
        .replace("{os}", &os_alternation(system));
    Regex::new(&expanded)
}

/// First asset matching `re`, ignoring checksum and signature files.
pub fn pick_asset<'a>(assets: &'a [Asset], re: &Regex) -> Option<&'a Asset> {
    const SIDECARS: [&str; 5] = [".sha256", ".sha256sum", ".sig", ".asc", ".pem"];
    assets
        .iter()
        .filter(|a| !SIDECARS.iter().any(|s| a.name.ends_with(s)))
        .find(|a| re.is_match(&a.name))
}

fn fetch_release(ctx: &StepContext<'_>, step: &ReleaseStep) -> anyhow::Result<ReleaseAssets> {
    let api = ctx.engine.options().github_api.trim_end_matches('/');
    let url = match &step.version {
        Some(tag) => format!("{}/repos/{}/releases/tags/{}", api, step.repo, tag),
        None => format!("{}/repos/{}/releases/latest", api, step.repo),
    };
    let mut request = ctx
        .engine
        .client()
        .get(&url)
        .header("Accept", "application/vnd.github+json");
    if let Ok(token) = std::env::var("GITHUB_TOKEN") {
        request = request.bearer_auth(token);
    }
    let response = request.send().with_context(|| format!("fetching {}", url))?;
    if !response.status().is_success() {
        bail!("HTTP {} fetching release of {}", response.status(), step.repo);
    }
    response
        .json()
        .with_context(|| format!("parsing release of {}", step.repo))
}

fn download_asset(ctx: &StepContext<'_>, asset: &Asset, into: &Path) -> anyhow::Result<PathBuf> {
    let mut response = ctx
        .engine
        .client()
        .get(&asset.browser_download_url)
        .send()
        .with_context(|| format!("downloading {}", asset.name))?;
    if !response.status().is_success() {
        bail!("HTTP {} downloading {}", response.status(), asset.name);
    }
    let path = into.join(&asset.name);
    let mut file = File::create(&path)?;
    response.copy_to(&mut file)?;
    file.flush()?;
    Ok(path)
}

/// Unpack `archive` into `into`; plain binaries are copied as-is.
pub fn extract(archive: &Path, into: &Path) -> anyhow::Result<()> {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    fs::create_dir_all(into)?;
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let decoder = GzDecoder::new(File::open(archive)?);
        tar::Archive::new(decoder)
            .unpack(into)
            .with_context(|| format!("unpacking {}", name))?;
    } else if name.ends_with(".zip") {
        let mut zip = zip::ZipArchive::new(File::open(archive)?)?;
        zip.extract(into).with_context(|| format!("unpacking {}", name))?;
    } else {
        let dest = into.join(archive.file_name().ok_or_else(|| anyhow!("asset has no name"))?);
        fs::copy(archive, &dest)?;
        make_executable(&dest)?;
    }
    Ok(())
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut entries: Vec<_> = entries.flatten().map(|e| e.path()).collect();
    entries.sort();
    for path in entries {
        if path.is_dir() {
            walk(&path, files);
        } else {
            files.push(path);
        }
    }
}

/// The named binary under `root`, or its first executable file.
pub fn find_binary(root: &Path, name: Option<&str>) -> Option<PathBuf> {
    let mut files = Vec::new();
    walk(root, &mut files);
    match name {
        Some(name) => files
            .into_iter()
            .find(|f| f.file_name().is_some_and(|n| n == name)),
        None => files.into_iter().find(|f| is_executable(f)),
    }
}

#[cfg(unix)]
fn writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

#[cfg(not(unix))]
fn writable(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|m| !m.permissions().readonly())
}

/// Where to install and whether that needs root.
///
/// An explicit directory wins. Otherwise `/usr/local/bin` when it is
/// writable or sudo is available, else `~/.local/bin`.
pub(crate) fn install_dir(ctx: &StepContext<'_>, explicit: Option<&str>) -> (PathBuf, bool) {
    if let Some(dir) = explicit {
        let dir = PathBuf::from(dir);
        let probe = dir.ancestors().find(|p| p.exists()).map(Path::to_path_buf);
        let needs_root = !probe.is_some_and(|p| writable(&p));
        return (dir, needs_root);
    }
    let system = PathBuf::from(SYSTEM_BIN);
    if writable(&system) {
        return (system, false);
    }
    let caps = &ctx.profile().capabilities;
    if caps.is_root || caps.has_sudo {
        return (system, true);
    }
    (ctx.engine.options().home.join(".local/bin"), false)
}

fn make_executable(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

fn place(ctx: &StepContext<'_>, binary: &Path, dir: &Path, needs_root: bool) -> anyhow::Result<PathBuf> {
    let name = binary.file_name().ok_or_else(|| anyhow!("binary has no name"))?;
    let dest = dir.join(name);
    if needs_root {
        let argv = vec![
            "install".to_string(),
            "-D".to_string(),
            "-m".to_string(),
            "0755".to_string(),
            binary.display().to_string(),
            dest.display().to_string(),
        ];
        let result = ctx.run_raw(&argv, true, None)?;
        if !result.success {
            bail!(result.error_message());
        }
    } else {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        fs::copy(binary, &dest)
            .with_context(|| format!("copying to {}", dest.display()))?;
        make_executable(&dest)?;
    }
    Ok(dest)
}

fn install_release(ctx: &StepContext<'_>, step: &ReleaseStep) -> anyhow::Result<(String, PathBuf)> {
    let release = fetch_release(ctx, step)?;
    let profile = ctx.profile();
    let re = asset_regex(&step.asset_pattern, &profile.hardware.arch, &profile.system)
        .with_context(|| format!("invalid asset pattern '{}'", step.asset_pattern))?;
    let asset = pick_asset(&release.assets, &re).ok_or_else(|| {
        anyhow!(
            "No asset of {} {} matches '{}' (have: {})",
            step.repo,
            release.tag_name,
            re.as_str(),
            release
                .assets
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        )
    })?;
    info!("Installing {} from {} {}", asset.name, step.repo, release.tag_name);

    let work = TempDir::with_prefix("rigup-release-")?;
    let archive = download_asset(ctx, asset, work.path())?;
    if let Some(expected) = &step.sha256 {
        let actual = sha256_file(&archive)?;
        if !actual.eq_ignore_ascii_case(expected) {
            bail!(
                "Checksum mismatch for {}: expected {}, got {}",
                asset.name,
                expected,
                actual
            );
        }
    }
    let unpacked = work.path().join("unpacked");
    extract(&archive, &unpacked)?;
    let binary = find_binary(&unpacked, step.binary.as_deref()).ok_or_else(|| {
        anyhow!(
            "{} not found in {}",
            step.binary.as_deref().unwrap_or("An executable"),
            asset.name
        )
    })?;
    debug!("Found binary at {}", binary.display());

    let (dir, needs_root) = install_dir(ctx, step.install_dir.as_deref());
    let dest = place(ctx, &binary, &dir, needs_root)?;
    Ok((release.tag_name, dest))
}

/// Run a GitHub release step.
pub(crate) fn install(ctx: &StepContext<'_>, step: &ReleaseStep) -> StepOutcome {
    match install_release(ctx, step) {
        Ok((tag, dest)) => {
            StepOutcome::ok(format!("Installed {} {} to {}", step.repo, tag, dest.display()))
                .with_path(dest)
        }
        Err(e) => StepOutcome::fail(format!("{:#}", e)),
    }
}
