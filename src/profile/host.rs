//! Live host probes.
//!
//! Non-interactive subprocesses do not see the PATH additions that installers
//! like rustup or pipx put in shell rc files. Lookups therefore search a
//! widened PATH: the process PATH followed by the well-known per-user and
//! per-system bin directories installers write to.

use std::path::{Path, PathBuf};

use crate::shell::{execute, CommandOptions};

/// Directories installers commonly drop binaries into, relative to `$HOME`.
const HOME_BIN_DIRS: &[&str] = &[".cargo/bin", ".local/bin", "go/bin", ".bun/bin", ".deno/bin"];

/// System directories that may be missing from a minimal PATH.
const SYSTEM_BIN_DIRS: &[&str] = &["/usr/local/bin", "/usr/local/go/bin", "/snap/bin", "/opt/homebrew/bin"];

/// Questions about the live machine that a profile snapshot cannot answer.
///
/// The resolver and engine take `&dyn Host` so tests can describe an empty or
/// partially provisioned machine without touching the real one.
pub trait Host {
    /// Resolve a binary on the widened PATH.
    fn which(&self, binary: &str) -> Option<PathBuf>;

    /// Whether a system package is installed according to the package manager.
    fn package_installed(&self, package_manager: &str, package: &str) -> bool;

    /// Whether a binary can be found.
    fn has_binary(&self, binary: &str) -> bool {
        self.which(binary).is_some()
    }

    /// Filter `packages` down to the ones not yet installed.
    fn missing_packages(&self, package_manager: &str, packages: &[String]) -> Vec<String> {
        packages
            .iter()
            .filter(|p| !self.package_installed(package_manager, p))
            .cloned()
            .collect()
    }
}

/// Build the widened PATH: process PATH, then home and system bin dirs,
/// then any extra entries (e.g. from a tool's `post_env`).
pub fn widened_path(extra: &[PathBuf]) -> Vec<PathBuf> {
    let mut entries: Vec<PathBuf> = Vec::new();
    let mut push = |p: PathBuf| {
        if !entries.contains(&p) {
            entries.push(p);
        }
    };

    for p in extra {
        push(p.clone());
    }
    if let Some(path) = std::env::var_os("PATH") {
        for p in std::env::split_paths(&path) {
            push(p);
        }
    }
    if let Some(home) = dirs::home_dir() {
        for rel in HOME_BIN_DIRS {
            push(home.join(rel));
        }
    }
    for dir in SYSTEM_BIN_DIRS {
        push(PathBuf::from(dir));
    }
    entries
}

/// Check whether a file has executable permission bits set.
#[cfg(unix)]
pub fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// On Windows, executability is determined by file extension, not permission bits.
#[cfg(not(unix))]
pub fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Shell probe that exits 0 when `package` is installed.
pub fn package_probe_command(package_manager: &str, package: &str) -> Option<String> {
    let cmd = match package_manager {
        "apt" => format!(
            "dpkg-query -W -f='${{Status}}' {} 2>/dev/null | grep -q 'install ok installed'",
            package
        ),
        "dnf" | "yum" | "zypper" => format!("rpm -q {} >/dev/null 2>&1", package),
        "apk" => format!("apk info -e {} >/dev/null 2>&1", package),
        "pacman" => format!("pacman -Q {} >/dev/null 2>&1", package),
        "brew" => format!("brew list --versions {} >/dev/null 2>&1", package),
        "snap" => format!("snap list {} >/dev/null 2>&1", package),
        _ => return None,
    };
    Some(cmd)
}

/// One non-interactive install invocation for a batch of packages.
pub fn package_install_command(package_manager: &str, packages: &[String]) -> Option<Vec<String>> {
    let prefix: &[&str] = match package_manager {
        "apt" => &["apt-get", "install", "-y"],
        "dnf" => &["dnf", "install", "-y"],
        "yum" => &["yum", "install", "-y"],
        "zypper" => &["zypper", "install", "-y"],
        "apk" => &["apk", "add"],
        "pacman" => &["pacman", "-S", "--noconfirm"],
        "brew" => &["brew", "install"],
        _ => return None,
    };
    let mut argv: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
    argv.extend(packages.iter().cloned());
    Some(argv)
}

/// Whether installing with this package manager requires root.
pub fn package_manager_needs_sudo(package_manager: &str) -> bool {
    package_manager != "brew"
}

/// The real machine.
#[derive(Debug, Clone, Default)]
pub struct LiveHost {
    /// Additional PATH entries searched before the widened defaults.
    extra_path: Vec<PathBuf>,
}

impl LiveHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search these directories first.
    pub fn with_extra_path(mut self, dirs: Vec<PathBuf>) -> Self {
        self.extra_path = dirs;
        self
    }
}

impl Host for LiveHost {
    fn which(&self, binary: &str) -> Option<PathBuf> {
        let search = std::env::join_paths(widened_path(&self.extra_path)).ok()?;
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        which::which_in(binary, Some(search), cwd)
            .ok()
            .filter(|p| is_executable(p))
    }

    fn package_installed(&self, package_manager: &str, package: &str) -> bool {
        let Some(probe) = package_probe_command(package_manager, package) else {
            return false;
        };
        let options = CommandOptions {
            capture_stdout: true,
            capture_stderr: true,
            timeout: Some(30),
            ..Default::default()
        };
        execute(&probe, &options)
            .map(|r| r.success)
            .unwrap_or(false)
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::HashSet;

    /// A host with an explicit set of binaries and packages.
    #[derive(Debug, Clone, Default)]
    pub struct FakeHost {
        pub binaries: HashSet<String>,
        pub packages: HashSet<String>,
    }

    impl FakeHost {
        pub fn empty() -> Self {
            Self::default()
        }

        pub fn with_binaries(binaries: &[&str]) -> Self {
            Self {
                binaries: binaries.iter().map(|b| b.to_string()).collect(),
                packages: HashSet::new(),
            }
        }

        pub fn with_packages(mut self, packages: &[&str]) -> Self {
            self.packages
                .extend(packages.iter().map(|p| p.to_string()));
            self
        }
    }

    impl Host for FakeHost {
        fn which(&self, binary: &str) -> Option<PathBuf> {
            self.binaries
                .contains(binary)
                .then(|| PathBuf::from("/usr/bin").join(binary))
        }

        fn package_installed(&self, _package_manager: &str, package: &str) -> bool {
            self.packages.contains(package)
        }
    }
}
