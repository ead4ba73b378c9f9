//! System profile snapshot and host probes.
//!
//! A [`SystemProfile`] is produced by an external detector and is read-only
//! here. The [`Host`] trait covers the live questions the resolver and engine
//! still need to ask the machine (is a binary on PATH, is a package
//! installed).
//!
//! # Modules
//!
//! - [`accessor`] - Typed lookups for dotted profile keys used in recipe predicates
//! - [`host`] - PATH and package-manager probes

pub mod accessor;
pub mod host;

pub use accessor::{ProfileKey, ProfileValue};
pub use host::{
    is_executable, package_install_command, package_manager_needs_sudo, widened_path, Host,
    LiveHost,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Read-only snapshot of the current machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemProfile {
    /// Operating system kernel name ("linux", "darwin").
    pub system: String,
    pub package_manager: PackageManagerInfo,
    pub distro: DistroInfo,
    pub capabilities: Capabilities,
    pub container: ContainerInfo,
    pub hardware: HardwareInfo,
    pub network: NetworkInfo,
    /// Detected versions of reference software (e.g. "kernel", "glibc").
    pub versions: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageManagerInfo {
    /// The system package manager ("apt", "dnf", "brew", ...).
    pub primary: String,
    pub snap_available: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DistroInfo {
    /// Distro family used to key package lists ("debian", "rhel", "alpine", ...).
    pub family: String,
    pub id: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub has_sudo: bool,
    pub has_systemd: bool,
    pub has_openrc: bool,
    pub is_root: bool,
    pub writable_rootfs: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerInfo {
    pub in_container: bool,
    pub runtime: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareInfo {
    pub arch: String,
    pub cpu_cores: u32,
    pub cpu_flags: Vec<String>,
    pub ram_gb: f64,
    pub disk_free_gb: f64,
    pub gpu: GpuInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuInfo {
    pub nvidia: GpuVendor,
    pub amd: GpuVendor,
    pub intel: GpuVendor,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GpuVendor {
    pub present: bool,
    pub model: Option<String>,
    /// Driver/runtime version (CUDA for nvidia, ROCm for amd).
    pub runtime_version: Option<String>,
    pub compute_capability: Option<f64>,
    pub vram_gb: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkInfo {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub no_proxy: Option<String>,
}

impl SystemProfile {
    /// Whether this machine runs Linux.
    pub fn is_linux(&self) -> bool {
        self.system.eq_ignore_ascii_case("linux")
    }

    /// Whether the root filesystem can be written to.
    ///
    /// Unknown is treated as writable; immutable distros report `false`
    /// explicitly.
    pub fn writable_rootfs(&self) -> bool {
        self.capabilities.writable_rootfs.unwrap_or(true)
    }

    /// Detected init system name.
    pub fn init_system(&self) -> InitSystem {
        if self.capabilities.has_systemd {
            InitSystem::Systemd
        } else if self.capabilities.has_openrc {
            InitSystem::OpenRc
        } else {
            InitSystem::SysVinit
        }
    }

    /// Parse a profile from the detector's JSON output.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Service manager flavor, derived from profile capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitSystem {
    Systemd,
    OpenRc,
    SysVinit,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// A Debian box with apt, systemd and sudo, running as a normal user.
    pub fn debian() -> SystemProfile {
        SystemProfile {
            system: "linux".into(),
            package_manager: PackageManagerInfo {
                primary: "apt".into(),
                snap_available: false,
            },
            distro: DistroInfo {
                family: "debian".into(),
                id: "ubuntu".into(),
                version: "24.04".into(),
            },
            capabilities: Capabilities {
                has_sudo: true,
                has_systemd: true,
                has_openrc: false,
                is_root: false,
                writable_rootfs: Some(true),
            },
            hardware: HardwareInfo {
                arch: "amd64".into(),
                cpu_cores: 8,
                ram_gb: 16.0,
                disk_free_gb: 120.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// A Fedora box with dnf.
    pub fn fedora() -> SystemProfile {
        let mut profile = debian();
        profile.package_manager.primary = "dnf".into();
        profile.distro = DistroInfo {
            family: "rhel".into(),
            id: "fedora".into(),
            version: "40".into(),
        };
        profile
    }

    /// An Alpine container running as root with OpenRC.
    pub fn alpine_container() -> SystemProfile {
        let mut profile = debian();
        profile.package_manager.primary = "apk".into();
        profile.distro = DistroInfo {
            family: "alpine".into(),
            id: "alpine".into(),
            version: "3.20".into(),
        };
        profile.capabilities.has_systemd = false;
        profile.capabilities.has_openrc = true;
        profile.capabilities.is_root = true;
        profile.container.in_container = true;
        profile
    }
}
