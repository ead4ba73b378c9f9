//! Install method selection.
//!
//! One precedence applies to install maps and to update/remove/rollback
//! command maps:
//!
//! 1. the recipe's `prefer` list, skipping methods this system cannot use
//! 2. the primary package manager
//! 3. `snap`, when snapd is available
//! 4. `_default`
//! 5. any other method whose binary is on PATH (or is installed earlier in
//!    the dependency chain)
//!
//! `source` is only picked after all of the above.

use crate::lint::rules::PACKAGE_MANAGERS;
use crate::profile::{Host, SystemProfile};
use crate::recipe::{MethodCommands, ToolRecipe};

/// The binary a method key runs.
pub fn method_binary(method: &str) -> Option<&'static str> {
    let binary = match method {
        "apt" => "apt-get",
        "dnf" => "dnf",
        "yum" => "yum",
        "zypper" => "zypper",
        "apk" => "apk",
        "pacman" => "pacman",
        "brew" => "brew",
        "snap" => "snap",
        "flatpak" => "flatpak",
        "pip" => "pip3",
        "pipx" => "pipx",
        "npm" => "npm",
        "cargo" => "cargo",
        "go" => "go",
        _ => return None,
    };
    Some(binary)
}

/// Whether `method` is a system package manager key.
pub fn is_package_manager(method: &str) -> bool {
    PACKAGE_MANAGERS.contains(&method)
}

/// What the selector needs to know about the machine.
pub struct MethodContext<'a> {
    pub primary_pm: &'a str,
    pub snap_available: bool,
    pub host: &'a dyn Host,
    /// Binaries that will exist by the time this method runs (installed by
    /// dependencies earlier in the plan).
    pub provided: &'a [String],
}

impl<'a> MethodContext<'a> {
    pub fn new(profile: &'a SystemProfile, host: &'a dyn Host) -> Self {
        Self {
            primary_pm: &profile.package_manager.primary,
            snap_available: profile.package_manager.snap_available,
            host,
            provided: &[],
        }
    }

    pub fn with_provided(mut self, provided: &'a [String]) -> Self {
        self.provided = provided;
        self
    }

    /// Whether this system can use `method` at all.
    pub fn usable(&self, method: &str) -> bool {
        match method {
            "_default" | "source" => true,
            "snap" => self.snap_available,
            "brew" => self.primary_pm == "brew" || self.host.has_binary("brew"),
            m if is_package_manager(m) => m == self.primary_pm,
            m => self.binary_available(m),
        }
    }

    fn binary_available(&self, method: &str) -> bool {
        let Some(binary) = method_binary(method) else {
            return false;
        };
        self.host.has_binary(binary)
            || self.provided.iter().any(|p| p == method || p == binary)
    }
}

/// Apply the precedence to an arbitrary set of method keys.
fn select<'m>(
    methods: &[&'m str],
    prefer: &[String],
    ctx: &MethodContext<'_>,
) -> Option<&'m str> {
    let has = |m: &str| methods.iter().find(|k| **k == m).copied();

    for preferred in prefer {
        if let Some(m) = has(preferred.as_str()) {
            if ctx.usable(m) {
                return Some(m);
            }
        }
    }
    if let Some(m) = has(ctx.primary_pm) {
        return Some(m);
    }
    if ctx.snap_available {
        if let Some(m) = has("snap") {
            return Some(m);
        }
    }
    if let Some(m) = has("_default") {
        return Some(m);
    }
    if let Some(m) = methods
        .iter()
        .copied()
        .filter(|m| *m != "source" && !is_package_manager(m) && *m != "snap")
        .find(|m| ctx.binary_available(m))
    {
        return Some(m);
    }
    if ctx.primary_pm != "brew" && ctx.host.has_binary("brew") {
        if let Some(m) = has("brew") {
            return Some(m);
        }
    }
    has("source")
}

/// Pick the install method for a tool recipe.
pub fn pick_install_method(tool: &ToolRecipe, ctx: &MethodContext<'_>) -> Option<String> {
    let methods: Vec<&str> = tool.install.keys().map(String::as_str).collect();
    let provided: Vec<String> = tool
        .requires
        .binaries
        .iter()
        .chain(ctx.provided.iter())
        .cloned()
        .collect();
    let ctx = MethodContext {
        primary_pm: ctx.primary_pm,
        snap_available: ctx.snap_available,
        host: ctx.host,
        provided: &provided,
    };
    select(&methods, &tool.prefer, &ctx).map(str::to_string)
}

/// Pick the command from a method-keyed map (update/remove/rollback).
///
/// When `installed_with` is known and present in the map, it wins: a tool
/// installed with cargo is removed with cargo.
pub fn pick_method_command<'m>(
    map: &'m MethodCommands,
    installed_with: Option<&str>,
    ctx: &MethodContext<'_>,
) -> Option<(&'m str, &'m Vec<String>)> {
    if let Some(method) = installed_with {
        if let Some((k, v)) = map.get_key_value(method) {
            return Some((k.as_str(), v));
        }
    }
    let methods: Vec<&str> = map.keys().map(String::as_str).collect();
    let chosen = select(&methods, &[], ctx)?;
    map.get_key_value(chosen).map(|(k, v)| (k.as_str(), v))
}

/// Methods the recipe declares that this system cannot use.
pub fn unavailable_methods(tool: &ToolRecipe, ctx: &MethodContext<'_>) -> Vec<String> {
    tool.install
        .keys()
        .filter(|m| !ctx.usable(m))
        .cloned()
        .collect()
}
