//! Build-from-source expansion.
//!
//! A `source` install method is not a single command: it becomes toolchain
//! packages merged into the shared batch plus an acquire, build, install and
//! cleanup step run in a scratch build directory.

use crate::profile::{Host, SystemProfile};
use crate::recipe::{BuildSystem, SourceSpec, ToolRecipe};
use crate::shell::{join_argv, shell_quote};
use crate::steps::{Step, StepAction};

/// Default prefix for source installs.
pub const DEFAULT_PREFIX: &str = "/usr/local";

/// Build timeout when the recipe does not declare one.
pub const DEFAULT_BUILD_TIMEOUT: u64 = 1800;

/// Steps and packages produced by expanding a source spec.
#[derive(Debug, Clone, Default)]
pub struct SourcePlan {
    /// System packages providing missing toolchain binaries.
    pub toolchain_packages: Vec<String>,
    pub steps: Vec<Step>,
}

/// Package providing a toolchain binary on a distro family.
pub fn toolchain_package(binary: &str, family: &str) -> String {
    let mapped = match (binary, family) {
        ("gcc" | "cc" | "g++" | "make", "debian") => "build-essential",
        ("gcc" | "cc" | "g++" | "make", "alpine") => "build-base",
        ("gcc" | "cc", "rhel" | "suse" | "arch") => "gcc",
        ("g++", "rhel") => "gcc-c++",
        ("pkg-config", "rhel") => "pkgconf-pkg-config",
        ("pkg-config", "alpine" | "arch") => "pkgconf",
        ("cargo", "debian" | "rhel" | "alpine" | "arch") => "cargo",
        ("go", "debian") => "golang-go",
        ("go", "rhel") => "golang",
        ("ninja", "debian") => "ninja-build",
        ("ninja", "rhel") => "ninja-build",
        _ => binary,
    };
    mapped.to_string()
}

/// Scratch directory a tool is built in.
pub fn build_dir(tool_id: &str) -> String {
    format!("/tmp/rigup-build/{}", tool_id)
}

fn bash(script: String) -> Vec<String> {
    vec!["bash".into(), "-c".into(), script]
}

fn acquire_command(spec: &SourceSpec, dir: &str) -> Vec<String> {
    if let Some(repo) = &spec.git_repo {
        let mut argv = vec!["git".to_string(), "clone".to_string()];
        if let Some(depth) = spec.depth {
            argv.push("--depth".into());
            argv.push(depth.to_string());
        }
        if let Some(branch) = &spec.branch {
            argv.push("--branch".into());
            argv.push(branch.clone());
        }
        argv.push(repo.clone());
        argv.push(dir.to_string());
        return argv;
    }

    let version = spec.default_version.as_deref().unwrap_or("latest");
    let url = spec
        .tarball_url
        .as_deref()
        .unwrap_or_default()
        .replace("{version}", version);
    bash(format!(
        "rm -rf {dir} && mkdir -p {dir} && curl -fsSL {url} | tar -xz -C {dir} --strip-components=1",
        dir = shell_quote(dir),
        url = shell_quote(&url),
    ))
}

fn build_script(spec: &SourceSpec, prefix: &str, nproc: u32, cli: &str) -> Option<String> {
    let args = spec
        .configure_args
        .iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ");
    let script = match spec.build_system {
        BuildSystem::Autotools => format!(
            "([ -x ./configure ] || autoreconf -fi) && ./configure --prefix={} {} && make -j{}",
            prefix, args, nproc
        ),
        BuildSystem::Cmake => format!(
            "cmake -S . -B build -DCMAKE_BUILD_TYPE=Release -DCMAKE_INSTALL_PREFIX={} {} && cmake --build build -j {}",
            prefix, args, nproc
        ),
        BuildSystem::Make => format!("make -j{} {}", nproc, args),
        BuildSystem::Cargo => format!("cargo build --release {}", args),
        BuildSystem::Meson => format!(
            "meson setup build --prefix={} {} && ninja -C build -j {}",
            prefix, args, nproc
        ),
        BuildSystem::Go => format!("go build -o bin/{} {} .", cli, args),
        BuildSystem::Custom => return None,
    };
    Some(script.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn install_script(spec: &SourceSpec, prefix: &str, cli: &str) -> Option<String> {
    let script = match spec.build_system {
        BuildSystem::Autotools | BuildSystem::Make => "make install".to_string(),
        BuildSystem::Cmake => "cmake --install build".to_string(),
        BuildSystem::Meson => "ninja -C build install".to_string(),
        BuildSystem::Cargo => format!("cargo install --path . --root {}", prefix),
        BuildSystem::Go => format!("install -m 0755 bin/{} {}/bin/{}", cli, prefix, cli),
        BuildSystem::Custom => return None,
    };
    Some(script)
}

/// Expand `spec` for `tool_id` on this machine.
pub fn expand(
    tool_id: &str,
    tool: &ToolRecipe,
    spec: &SourceSpec,
    profile: &SystemProfile,
    host: &dyn Host,
) -> SourcePlan {
    let dir = build_dir(tool_id);
    let prefix = spec.install_prefix.as_deref().unwrap_or(DEFAULT_PREFIX);
    let nproc = profile.hardware.cpu_cores.max(1);
    let cli = tool.base.cli.as_deref().unwrap_or(tool_id);
    let timeout = spec.build_timeout.unwrap_or(DEFAULT_BUILD_TIMEOUT);
    let label = &tool.base.label;

    let mut toolchain_packages: Vec<String> = Vec::new();
    for binary in &spec.requires_toolchain {
        if !host.has_binary(binary) {
            let pkg = toolchain_package(binary, &profile.distro.family);
            if !toolchain_packages.contains(&pkg) {
                toolchain_packages.push(pkg);
            }
        }
    }

    let mut steps = Vec::new();

    let what = if spec.git_repo.is_some() { "Clone" } else { "Download" };
    steps.push(
        Step::new(
            format!("{} {} source", what, label),
            StepAction::Tool {
                command: acquire_command(spec, &dir),
                script_sha256: None,
                cwd: None,
            },
        )
        .with_tool(tool_id),
    );

    let build_commands: Vec<Vec<String>> = match build_script(spec, prefix, nproc, cli) {
        Some(script) => vec![bash(script)],
        None => spec.build_commands.clone(),
    };
    for (i, command) in build_commands.into_iter().enumerate() {
        let step_label = if i == 0 {
            format!("Build {}", label)
        } else {
            format!("Build {} ({})", label, join_argv(&command))
        };
        let mut step = Step::new(
            step_label,
            StepAction::Tool {
                command,
                script_sha256: None,
                cwd: Some(dir.clone()),
            },
        )
        .with_tool(tool_id);
        step.timeout = Some(timeout);
        steps.push(step);
    }

    if let Some(script) = install_script(spec, prefix, cli) {
        steps.push(
            Step::new(
                format!("Install {}", label),
                StepAction::Install {
                    command: bash(script),
                    cwd: Some(dir.clone()),
                },
            )
            .with_sudo(tool.method_needs_sudo("source"))
            .with_tool(tool_id),
        );
    }

    steps.push(
        Step::new(
            format!("Remove {} build directory", label),
            StepAction::Cleanup { path: dir },
        )
        .with_tool(tool_id),
    );

    SourcePlan {
        toolchain_packages,
        steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::fixtures;
    use crate::profile::host::fake::FakeHost;
    use crate::recipe::RecipeCatalog;

    fn recipe(id: &str) -> ToolRecipe {
        RecipeCatalog::builtin()
            .unwrap()
            .tool(id)
            .cloned()
            .unwrap()
    }

    #[test]
    fn tarball_build_expands_version_and_steps() {
        let jq = recipe("jq");
        let spec = jq.source_spec().unwrap().clone();
        let plan = expand("jq", &jq, &spec, &fixtures::debian(), &FakeHost::empty());

        assert_eq!(plan.toolchain_packages, vec!["build-essential"]);
        let kinds: Vec<&str> = plan.steps.iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, vec!["tool", "tool", "install", "cleanup"]);

        let acquire = plan.steps[0].command().unwrap().join(" ");
        assert!(acquire.contains("jq-1.7.1/jq-1.7.1.tar.gz"));
        assert!(!acquire.contains("{version}"));

        let build = plan.steps[1].command().unwrap().join(" ");
        assert!(build.contains("--with-oniguruma=builtin"));
        assert!(build.contains("make -j8"));
        assert!(plan.steps[2].needs_sudo);
    }

    #[test]
    fn git_build_clones_with_depth_and_branch() {
        let tmux = recipe("tmux");
        let spec = tmux.source_spec().unwrap().clone();
        let host = FakeHost::with_binaries(&["gcc", "make"]);
        let plan = expand("tmux", &tmux, &spec, &fixtures::fedora(), &host);

        assert_eq!(
            plan.steps[0].command().unwrap()[..6],
            ["git", "clone", "--depth", "1", "--branch", "master"]
        );
        assert!(plan.toolchain_packages.contains(&"pkgconf-pkg-config".to_string()));
        assert!(!plan.toolchain_packages.contains(&"gcc".to_string()));
    }

    #[test]
    fn custom_build_runs_declared_commands() {
        let tool = ToolRecipe::default();
        let spec = SourceSpec {
            git_repo: Some("https://example.com/x.git".into()),
            build_system: BuildSystem::Custom,
            build_commands: vec![
                vec!["./bootstrap.sh".into()],
                vec!["make".into(), "install".into()],
            ],
            ..Default::default()
        };
        let plan = expand("x", &tool, &spec, &fixtures::debian(), &FakeHost::empty());
        let kinds: Vec<&str> = plan.steps.iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, vec!["tool", "tool", "tool", "cleanup"]);
        assert_eq!(plan.steps[1].timeout, Some(DEFAULT_BUILD_TIMEOUT));
    }

    #[test]
    fn toolchain_packages_follow_family() {
        assert_eq!(toolchain_package("gcc", "alpine"), "build-base");
        assert_eq!(toolchain_package("bison", "debian"), "bison");
    }
}
