//! Typed lookups for dotted profile keys.
//!
//! Recipes gate options on hardware and platform facts with keys like
//! `gpu.nvidia.present` or `hardware.ram_gb`. Instead of walking an untyped
//! document, every supported key is a [`ProfileKey`] variant mapped to a
//! typed getter on [`SystemProfile`]. Unknown keys are rejected when the key
//! is parsed, so a typo in a recipe surfaces as an unavailable option with
//! a clear reason rather than a silent `false`.

use std::fmt;
use std::str::FromStr;

use super::SystemProfile;

/// A profile fact addressable from recipe predicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileKey {
    System,
    PackageManager,
    SnapAvailable,
    DistroFamily,
    DistroId,
    DistroVersion,
    HasSudo,
    HasSystemd,
    HasOpenrc,
    IsRoot,
    InContainer,
    Arch,
    CpuCores,
    CpuFlag(String),
    RamGb,
    DiskFreeGb,
    GpuPresent(GpuVendorKey),
    GpuRuntimeVersion(GpuVendorKey),
    GpuComputeCapability(GpuVendorKey),
    GpuVramGb(GpuVendorKey),
    Version(String),
}

/// GPU vendor selector inside a [`ProfileKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuVendorKey {
    Nvidia,
    Amd,
    Intel,
}

/// The value behind a [`ProfileKey`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileValue {
    Bool(bool),
    Number(f64),
    Text(String),
    Missing,
}

impl ProfileValue {
    /// Numeric view. Version-like text keeps its major.minor ("12.4.1" reads
    /// as 12.4).
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ProfileValue::Number(n) => Some(*n),
            ProfileValue::Text(s) => s.trim().parse().ok().or_else(|| {
                let major_minor: String = s
                    .split('.')
                    .take(2)
                    .collect::<Vec<_>>()
                    .join(".");
                major_minor.parse().ok()
            }),
            ProfileValue::Bool(_) | ProfileValue::Missing => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ProfileValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl fmt::Display for ProfileValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileValue::Bool(b) => write!(f, "{}", b),
            ProfileValue::Number(n) => write!(f, "{}", n),
            ProfileValue::Text(s) => write!(f, "{}", s),
            ProfileValue::Missing => write!(f, "unknown"),
        }
    }
}

fn vendor(name: &str) -> Option<GpuVendorKey> {
    match name {
        "nvidia" => Some(GpuVendorKey::Nvidia),
        "amd" => Some(GpuVendorKey::Amd),
        "intel" => Some(GpuVendorKey::Intel),
        _ => None,
    }
}

impl FromStr for ProfileKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.strip_prefix("hardware.").unwrap_or(s);
        let parts: Vec<&str> = key.split('.').collect();
        let parsed = match parts.as_slice() {
            ["system"] => ProfileKey::System,
            ["package_manager", "primary"] | ["package_manager"] => ProfileKey::PackageManager,
            ["package_manager", "snap_available"] => ProfileKey::SnapAvailable,
            ["distro", "family"] => ProfileKey::DistroFamily,
            ["distro", "id"] => ProfileKey::DistroId,
            ["distro", "version"] => ProfileKey::DistroVersion,
            ["capabilities", "has_sudo"] | ["has_sudo"] => ProfileKey::HasSudo,
            ["capabilities", "has_systemd"] | ["has_systemd"] => ProfileKey::HasSystemd,
            ["capabilities", "has_openrc"] | ["has_openrc"] => ProfileKey::HasOpenrc,
            ["capabilities", "is_root"] | ["is_root"] => ProfileKey::IsRoot,
            ["container", "in_container"] | ["in_container"] => ProfileKey::InContainer,
            ["arch"] => ProfileKey::Arch,
            ["cpu_cores"] => ProfileKey::CpuCores,
            ["cpu_flags", flag] => ProfileKey::CpuFlag((*flag).to_string()),
            ["ram_gb"] => ProfileKey::RamGb,
            ["disk_free_gb"] => ProfileKey::DiskFreeGb,
            ["gpu", v, field] => {
                let v = vendor(v).ok_or_else(|| format!("unknown GPU vendor in '{}'", s))?;
                match *field {
                    "present" => ProfileKey::GpuPresent(v),
                    "runtime_version" | "cuda_version" | "rocm_version" => {
                        ProfileKey::GpuRuntimeVersion(v)
                    }
                    "compute_capability" => ProfileKey::GpuComputeCapability(v),
                    "vram_gb" => ProfileKey::GpuVramGb(v),
                    _ => return Err(format!("unknown profile key '{}'", s)),
                }
            }
            ["versions", name] => ProfileKey::Version((*name).to_string()),
            _ => return Err(format!("unknown profile key '{}'", s)),
        };
        Ok(parsed)
    }
}

impl ProfileKey {
    /// Read this key from a profile.
    pub fn read(&self, profile: &SystemProfile) -> ProfileValue {
        let text = |s: &str| {
            if s.is_empty() {
                ProfileValue::Missing
            } else {
                ProfileValue::Text(s.to_string())
            }
        };
        let opt_num = |n: Option<f64>| n.map_or(ProfileValue::Missing, ProfileValue::Number);

        match self {
            ProfileKey::System => text(&profile.system),
            ProfileKey::PackageManager => text(&profile.package_manager.primary),
            ProfileKey::SnapAvailable => ProfileValue::Bool(profile.package_manager.snap_available),
            ProfileKey::DistroFamily => text(&profile.distro.family),
            ProfileKey::DistroId => text(&profile.distro.id),
            ProfileKey::DistroVersion => text(&profile.distro.version),
            ProfileKey::HasSudo => ProfileValue::Bool(profile.capabilities.has_sudo),
            ProfileKey::HasSystemd => ProfileValue::Bool(profile.capabilities.has_systemd),
            ProfileKey::HasOpenrc => ProfileValue::Bool(profile.capabilities.has_openrc),
            ProfileKey::IsRoot => ProfileValue::Bool(profile.capabilities.is_root),
            ProfileKey::InContainer => ProfileValue::Bool(profile.container.in_container),
            ProfileKey::Arch => text(&profile.hardware.arch),
            ProfileKey::CpuCores => ProfileValue::Number(profile.hardware.cpu_cores as f64),
            ProfileKey::CpuFlag(flag) => ProfileValue::Bool(
                profile
                    .hardware
                    .cpu_flags
                    .iter()
                    .any(|f| f.eq_ignore_ascii_case(flag)),
            ),
            ProfileKey::RamGb => ProfileValue::Number(profile.hardware.ram_gb),
            ProfileKey::DiskFreeGb => ProfileValue::Number(profile.hardware.disk_free_gb),
            ProfileKey::GpuPresent(v) => ProfileValue::Bool(gpu(profile, *v).present),
            ProfileKey::GpuRuntimeVersion(v) => gpu(profile, *v)
                .runtime_version
                .as_deref()
                .map_or(ProfileValue::Missing, text),
            ProfileKey::GpuComputeCapability(v) => opt_num(gpu(profile, *v).compute_capability),
            ProfileKey::GpuVramGb(v) => opt_num(gpu(profile, *v).vram_gb),
            ProfileKey::Version(name) => profile
                .versions
                .get(name)
                .map_or(ProfileValue::Missing, |v| text(v.as_str())),
        }
    }
}

fn gpu(profile: &SystemProfile, vendor: GpuVendorKey) -> &super::GpuVendor {
    match vendor {
        GpuVendorKey::Nvidia => &profile.hardware.gpu.nvidia,
        GpuVendorKey::Amd => &profile.hardware.gpu.amd,
        GpuVendorKey::Intel => &profile.hardware.gpu.intel,
    }
}

/// Look up a dotted key, returning `Err` for unsupported keys.
pub fn lookup(profile: &SystemProfile, key: &str) -> Result<ProfileValue, String> {
    key.parse::<ProfileKey>().map(|k| k.read(profile))
}
