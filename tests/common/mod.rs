//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use rigup::profile::{Capabilities, DistroInfo, HardwareInfo, Host, PackageManagerInfo, SystemProfile};
use rigup::recipe::RecipeCatalog;
use rigup::resolver::{Builtins, NetworkProbe, Release, ReleaseFeed, Resolver};

/// A host where only the listed binaries exist and no packages are installed.
#[derive(Default)]
pub struct StubHost {
    binaries: HashSet<String>,
}

impl StubHost {
    pub fn bare() -> Self {
        Self::default()
    }

    pub fn with(binaries: &[&str]) -> Self {
        Self {
            binaries: binaries.iter().map(|b| b.to_string()).collect(),
        }
    }
}

impl Host for StubHost {
    fn which(&self, binary: &str) -> Option<PathBuf> {
        self.binaries
            .contains(binary)
            .then(|| PathBuf::from("/usr/bin").join(binary))
    }

    fn package_installed(&self, _package_manager: &str, _package: &str) -> bool {
        false
    }
}

/// Every URL is unreachable.
pub struct Offline;

impl NetworkProbe for Offline {
    fn reachable(&self, _url: &str) -> bool {
        false
    }
}

/// A release feed with nothing published.
pub struct NoReleases;

impl ReleaseFeed for NoReleases {
    fn releases(&self, _repo: &str, _limit: usize) -> anyhow::Result<Vec<Release>> {
        Ok(Vec::new())
    }
}

pub fn catalog() -> Arc<RecipeCatalog> {
    Arc::new(RecipeCatalog::builtin().expect("builtin catalog must load"))
}

/// An offline resolver over the embedded catalog.
pub fn resolver(host: StubHost) -> Resolver {
    Resolver::new(catalog())
        .with_host(Box::new(host))
        .with_probe(Box::new(Offline))
        .with_feed(Box::new(NoReleases))
        .with_builtins(Builtins {
            user: "ada".into(),
            home: "/home/ada".into(),
            arch: "amd64".into(),
            nproc: "4".into(),
        })
}

fn linux(family: &str, id: &str, package_manager: &str) -> SystemProfile {
    SystemProfile {
        system: "linux".into(),
        package_manager: PackageManagerInfo {
            primary: package_manager.into(),
            snap_available: false,
        },
        distro: DistroInfo {
            family: family.into(),
            id: id.into(),
            version: String::new(),
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
            cpu_cores: 4,
            ram_gb: 8.0,
            disk_free_gb: 50.0,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn debian() -> SystemProfile {
    linux("debian", "debian", "apt")
}

pub fn fedora() -> SystemProfile {
    linux("rhel", "fedora", "dnf")
}

pub fn arch() -> SystemProfile {
    linux("arch", "arch", "pacman")
}

pub fn suse() -> SystemProfile {
    linux("suse", "opensuse-tumbleweed", "zypper")
}

pub fn alpine_container() -> SystemProfile {
    let mut profile = linux("alpine", "alpine", "apk");
    profile.capabilities.has_systemd = false;
    profile.capabilities.has_openrc = true;
    profile.capabilities.is_root = true;
    profile.container.in_container = true;
    profile
}

pub fn macos() -> SystemProfile {
    let mut profile = linux("macos", "macos", "brew");
    profile.system = "darwin".into();
    profile.capabilities.has_systemd = false;
    profile.hardware.arch = "arm64".into();
    profile
}

/// A root Debian box with an NVIDIA GPU, so GPU-gated options open up.
pub fn gpu_workstation() -> SystemProfile {
    let mut profile = debian();
    profile.capabilities.is_root = true;
    profile.hardware.gpu.nvidia.present = true;
    profile.hardware.gpu.nvidia.runtime_version = Some("12.4".into());
    profile.hardware.gpu.nvidia.compute_capability = Some(8.6);
    profile.hardware.gpu.nvidia.vram_gb = Some(24.0);
    profile
}

pub fn all_profiles() -> Vec<(&'static str, SystemProfile)> {
    vec![
        ("debian", debian()),
        ("fedora", fedora()),
        ("arch", arch()),
        ("suse", suse()),
        ("alpine", alpine_container()),
        ("macos", macos()),
        ("gpu", gpu_workstation()),
    ]
}
