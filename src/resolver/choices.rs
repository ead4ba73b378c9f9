//! Choice and input resolution.
//!
//! Every declared option is returned; options the machine cannot use are
//! marked unavailable with the reason, never dropped. All constraints of an
//! option are evaluated so the caller can show every reason, with the first
//! one surfaced as `disabled_reason`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::cache::TtlCache;
use super::condition::{check_predicate, holds};
use super::network::{host_key, NetworkProbe};
use super::versions::{Release, ReleaseFeed};
use crate::profile::{Host, SystemProfile};
use crate::recipe::{ChoiceSpec, InputSpec, OptionSpec, ToolRecipe, VersionChoiceSpec};
use crate::risk::RiskLevel;

/// Dynamic version lists are capped at this many entries by default.
pub const DEFAULT_MAX_VERSIONS: usize = 10;

/// The live checks option constraints need.
pub struct ChoiceContext<'a> {
    pub profile: &'a SystemProfile,
    pub host: &'a dyn Host,
    pub probe: &'a dyn NetworkProbe,
    pub reachability: &'a TtlCache<String, bool>,
    pub feed: &'a dyn ReleaseFeed,
    pub versions: &'a TtlCache<String, Vec<Release>>,
    pub now: DateTime<Utc>,
}

impl ChoiceContext<'_> {
    fn reachable(&self, url: &str) -> bool {
        let key = host_key(url);
        if let Some(hit) = self.reachability.get_at(&key, self.now) {
            return hit;
        }
        let ok = self.probe.reachable(url);
        debug!("reachability {} = {}", key, ok);
        self.reachability.insert_at(key, ok, self.now);
        ok
    }

    fn platform_matches(&self, platform: &str) -> bool {
        match platform {
            "linux" => self.profile.is_linux(),
            "darwin" | "macos" => {
                self.profile.system.eq_ignore_ascii_case("darwin")
                    || self.profile.distro.family == "macos"
            }
            family => self.profile.distro.family == family,
        }
    }
}

/// An option with its availability on this machine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedOption {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub available: bool,
    pub default: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled_reason: Option<String>,
    /// Which constraint kind produced `disabled_reason`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_constraint: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_reasons: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedChoice {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub options: Vec<ResolvedOption>,
    /// Default option id, if any option is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Exactly one option is available, so there is nothing to ask.
    pub auto_selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionEntry {
    pub id: String,
    pub label: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub prerelease: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// The version decision point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedVersion {
    pub label: String,
    /// `static`, `package_manager` or `dynamic`.
    pub source: String,
    pub options: Vec<VersionEntry>,
    pub default: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
}

/// Everything a caller needs to ask the user before planning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoiceResolution {
    pub tool: String,
    /// Already installed; nothing to ask.
    pub auto_resolve: bool,
    pub choices: Vec<ResolvedChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<ResolvedVersion>,
    /// Inputs whose condition holds under the defaults.
    pub inputs: Vec<InputSpec>,
    /// Choice id (and `version`) → default answer.
    pub defaults: BTreeMap<String, String>,
}

impl ChoiceResolution {
    pub fn already_installed(tool: &str) -> Self {
        Self {
            tool: tool.to_string(),
            auto_resolve: true,
            choices: Vec::new(),
            version: None,
            inputs: Vec::new(),
            defaults: BTreeMap::new(),
        }
    }
}

/// Evaluate every constraint of an option, returning `(kind, reason)` for
/// each failure.
pub fn option_failures(option: &OptionSpec, ctx: &ChoiceContext<'_>) -> Vec<(String, String)> {
    let req = &option.requires;
    let mut failures = Vec::new();

    for url in &req.network {
        if !ctx.reachable(url) {
            failures.push(("network".to_string(), format!("Cannot reach {}", url)));
        }
    }
    if !req.platforms.is_empty() && !req.platforms.iter().any(|p| ctx.platform_matches(p)) {
        failures.push((
            "platforms".to_string(),
            format!("Only supported on {}", req.platforms.join(", ")),
        ));
    }
    for binary in &req.binaries {
        if !ctx.host.has_binary(binary) {
            failures.push(("binaries".to_string(), format!("Requires {} on PATH", binary)));
        }
    }
    for (key, expected) in &req.hardware {
        if let Err(reason) = check_predicate(ctx.profile, key, expected) {
            failures.push(("hardware".to_string(), reason));
        }
    }
    failures
}

fn resolve_option(option: &OptionSpec, ctx: &ChoiceContext<'_>) -> ResolvedOption {
    let mut failures = option_failures(option, ctx).into_iter();
    let first = failures.next();
    let extra_reasons: Vec<String> = failures.map(|(_, reason)| reason).collect();
    let available = first.is_none();
    let (failed_constraint, disabled_reason) = match first {
        Some((kind, reason)) => (Some(kind), Some(reason)),
        None => (None, None),
    };

    ResolvedOption {
        id: option.id.clone(),
        label: option.label.clone(),
        description: option.description.clone(),
        available,
        default: false,
        disabled_reason,
        failed_constraint,
        extra_reasons,
        enable_hint: (!available).then(|| option.enable_hint.clone()).flatten(),
        risk: option.risk,
        warning: option.warning.clone(),
    }
}

/// Resolve one choice's options and default.
pub fn resolve_choice(choice: &ChoiceSpec, ctx: &ChoiceContext<'_>) -> ResolvedChoice {
    let mut options: Vec<ResolvedOption> =
        choice.options.iter().map(|o| resolve_option(o, ctx)).collect();

    let available: Vec<usize> = options
        .iter()
        .enumerate()
        .filter(|(_, o)| o.available)
        .map(|(i, _)| i)
        .collect();

    let declared_default = choice
        .options
        .iter()
        .position(|o| o.default)
        .filter(|i| options[*i].available);
    let default_index = declared_default.or_else(|| available.first().copied());
    if let Some(i) = default_index {
        options[i].default = true;
    }

    ResolvedChoice {
        id: choice.id.clone(),
        label: choice.label.clone(),
        description: choice.description.clone(),
        default: default_index.map(|i| options[i].id.clone()),
        auto_selected: available.len() == 1,
        options,
    }
}

/// Resolve the version decision point.
pub fn resolve_version(spec: &VersionChoiceSpec, ctx: &ChoiceContext<'_>) -> ResolvedVersion {
    match spec {
        VersionChoiceSpec::Static { label, options } => {
            let entries: Vec<VersionEntry> = options
                .iter()
                .map(|o| VersionEntry {
                    id: o.id.clone(),
                    label: o.label.clone().unwrap_or_else(|| o.id.clone()),
                    prerelease: false,
                    warning: None,
                })
                .collect();
            let default = options
                .iter()
                .find(|o| o.default)
                .or_else(|| options.first())
                .map(|o| o.id.clone())
                .unwrap_or_else(|| "latest".to_string());
            ResolvedVersion {
                label: label.clone().unwrap_or_else(|| "Version".to_string()),
                source: "static".into(),
                options: entries,
                default,
                fetch_error: None,
            }
        }
        VersionChoiceSpec::PackageManager { label } => ResolvedVersion {
            label: label.clone().unwrap_or_else(|| "Version".to_string()),
            source: "package_manager".into(),
            options: vec![latest_entry()],
            default: "latest".into(),
            fetch_error: None,
        },
        VersionChoiceSpec::Dynamic {
            label,
            github_repo,
            max_versions,
            include_prerelease,
        } => {
            let limit = max_versions.unwrap_or(DEFAULT_MAX_VERSIONS).max(1);
            let label = label.clone().unwrap_or_else(|| "Version".to_string());
            match fetch_releases(github_repo, limit, ctx) {
                Ok(releases) => {
                    let mut options: Vec<VersionEntry> = releases
                        .into_iter()
                        .filter(|r| *include_prerelease || !r.prerelease)
                        .take(limit)
                        .map(|r| VersionEntry {
                            label: r.tag_name.clone(),
                            warning: r
                                .prerelease
                                .then(|| "Pre-release: may be unstable".to_string()),
                            prerelease: r.prerelease,
                            id: r.tag_name,
                        })
                        .collect();
                    let default = options
                        .iter()
                        .find(|o| !o.prerelease)
                        .map(|o| o.id.clone())
                        .unwrap_or_else(|| "latest".to_string());
                    if options.is_empty() {
                        options.push(latest_entry());
                    }
                    ResolvedVersion {
                        label,
                        source: "dynamic".into(),
                        options,
                        default,
                        fetch_error: None,
                    }
                }
                Err(e) => {
                    warn!("Could not list releases for {}: {}", github_repo, e);
                    ResolvedVersion {
                        label,
                        source: "dynamic".into(),
                        options: vec![latest_entry()],
                        default: "latest".into(),
                        fetch_error: Some(e.to_string()),
                    }
                }
            }
        }
    }
}

fn latest_entry() -> VersionEntry {
    VersionEntry {
        id: "latest".into(),
        label: "Latest".into(),
        prerelease: false,
        warning: None,
    }
}

fn fetch_releases(repo: &str, limit: usize, ctx: &ChoiceContext<'_>) -> anyhow::Result<Vec<Release>> {
    let key = format!("{}#{}", repo, limit);
    if let Some(hit) = ctx.versions.get_at(&key, ctx.now) {
        return Ok(hit);
    }
    let releases = ctx.feed.releases(repo, limit)?;
    ctx.versions.insert_at(key, releases.clone(), ctx.now);
    Ok(releases)
}

/// Whether an input applies under the given answers.
pub fn input_applies(
    input: &InputSpec,
    answers: &BTreeMap<String, String>,
    profile: &SystemProfile,
) -> bool {
    let Some(cond) = &input.condition else {
        return true;
    };
    if let Some(flag) = cond.profile {
        if !holds(flag, profile) {
            return false;
        }
    }
    if let Some(choice) = &cond.choice {
        let answer = answers.get(choice).map(String::as_str);
        if let Some(want) = &cond.equals {
            if answer != Some(want.as_str()) {
                return false;
            }
        }
        if let Some(reject) = &cond.not_equals {
            if answer == Some(reject.as_str()) {
                return false;
            }
        }
    }
    true
}

/// Resolve all choices, the version and the applicable inputs of a tool.
pub fn resolve_choices(tool_id: &str, tool: &ToolRecipe, ctx: &ChoiceContext<'_>) -> ChoiceResolution {
    let choices: Vec<ResolvedChoice> = tool.choices.iter().map(|c| resolve_choice(c, ctx)).collect();

    let mut defaults: BTreeMap<String, String> = choices
        .iter()
        .filter_map(|c| c.default.clone().map(|d| (c.id.clone(), d)))
        .collect();

    let version = tool.version_choice.as_ref().map(|v| resolve_version(v, ctx));
    if let Some(v) = &version {
        defaults.insert("version".into(), v.default.clone());
    }

    let inputs = tool
        .inputs
        .iter()
        .filter(|i| input_applies(i, &defaults, ctx.profile))
        .cloned()
        .collect();

    ChoiceResolution {
        tool: tool_id.to_string(),
        auto_resolve: false,
        choices,
        version,
        inputs,
        defaults,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::fixtures;
    use crate::profile::host::fake::FakeHost;
    use crate::recipe::RecipeCatalog;
    use crate::resolver::network::fake::FakeProbe;
    use crate::resolver::versions::fake::FakeFeed;
    use chrono::Duration;
    use std::sync::atomic::Ordering;

    struct Fixture {
        host: FakeHost,
        probe: FakeProbe,
        feed: FakeFeed,
        reach: TtlCache<String, bool>,
        versions: TtlCache<String, Vec<Release>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                host: FakeHost::empty(),
                probe: FakeProbe::default(),
                feed: FakeFeed::default(),
                reach: TtlCache::new(60),
                versions: TtlCache::new(300),
            }
        }

        fn ctx<'a>(&'a self, profile: &'a SystemProfile) -> ChoiceContext<'a> {
            ChoiceContext {
                profile,
                host: &self.host,
                probe: &self.probe,
                reachability: &self.reach,
                feed: &self.feed,
                versions: &self.versions,
                now: Utc::now(),
            }
        }
    }

    fn tool(id: &str) -> ToolRecipe {
        RecipeCatalog::builtin().unwrap().tool(id).cloned().unwrap()
    }

    #[test]
    fn pytorch_without_gpu_keeps_all_options() {
        let fx = Fixture::new();
        let profile = fixtures::debian();
        let pytorch = tool("pytorch");
        let res = resolve_choices("pytorch", &pytorch, &fx.ctx(&profile));

        let backend = &res.choices[0];
        assert_eq!(backend.options.len(), 3);
        assert_eq!(backend.default.as_deref(), Some("cpu"));
        assert!(backend.auto_selected);

        let cuda = &backend.options[1];
        assert!(!cuda.available);
        assert_eq!(cuda.failed_constraint.as_deref(), Some("hardware"));
        assert!(cuda.disabled_reason.is_some());
        assert_eq!(cuda.extra_reasons.len(), 1);
        assert!(cuda.enable_hint.is_some());

        assert!(res.inputs.is_empty(), "cuda_arch only applies to cuda");
    }

    #[test]
    fn pytorch_with_cuda_gpu_offers_cuda() {
        let fx = Fixture::new();
        let mut profile = fixtures::debian();
        profile.hardware.gpu.nvidia.present = true;
        profile.hardware.gpu.nvidia.runtime_version = Some("12.4".into());
        let res = resolve_choices("pytorch", &tool("pytorch"), &fx.ctx(&profile));

        let backend = &res.choices[0];
        assert!(backend.options[1].available);
        assert!(!backend.auto_selected);
        assert_eq!(backend.default.as_deref(), Some("cpu"));
    }

    #[test]
    fn unavailable_default_falls_back_to_first_available() {
        let fx = Fixture::new();
        let mut profile = fixtures::debian();
        profile.hardware.gpu.nvidia.present = true;
        profile.hardware.gpu.nvidia.compute_capability = Some(8.6);
        let mut driver = tool("nvidia-driver");
        driver.choices[0].options[0].requires.binaries = vec!["dkms".into()];

        let choice = resolve_choice(&driver.choices[0], &fx.ctx(&profile));
        assert!(!choice.options[0].available);
        assert_eq!(choice.default.as_deref(), Some("open"));
        assert!(choice.options[1].default);
    }

    #[test]
    fn network_probe_is_cached_by_host() {
        let fx = Fixture::new();
        let profile = fixtures::debian();
        let option: OptionSpec = serde_json::from_value(serde_json::json!({
            "id": "mirror",
            "label": "Mirror",
            "requires": {"network": ["https://mirror.example/a", "https://mirror.example/b"]}
        }))
        .unwrap();

        let ctx = fx.ctx(&profile);
        let failures = option_failures(&option, &ctx);
        assert_eq!(failures.len(), 2);
        assert_eq!(fx.probe.calls.load(Ordering::SeqCst), 1);

        let later = ChoiceContext {
            now: ctx.now + Duration::seconds(61),
            ..ctx
        };
        option_failures(&option, &later);
        assert_eq!(fx.probe.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn platform_mismatch_is_a_reason() {
        let fx = Fixture::new();
        let mut profile = fixtures::debian();
        profile.system = "darwin".into();
        profile.distro.family = "macos".into();
        profile.hardware.gpu.amd.present = true;
        let res = resolve_choices("pytorch", &tool("pytorch"), &fx.ctx(&profile));
        let rocm = &res.choices[0].options[2];
        assert_eq!(rocm.failed_constraint.as_deref(), Some("platforms"));
    }

    #[test]
    fn static_version_default() {
        let fx = Fixture::new();
        let profile = fixtures::debian();
        let res = resolve_choices("kubectl", &tool("kubectl"), &fx.ctx(&profile));
        let version = res.version.unwrap();
        assert_eq!(version.source, "static");
        assert_eq!(version.default, "v1.31.0");
        assert_eq!(res.defaults["version"], "v1.31.0");
    }

    #[test]
    fn dynamic_versions_flag_prereleases_and_cache() {
        let mut fx = Fixture::new();
        fx.feed = FakeFeed::with_tags(&[("v0.45.0-rc1", true), ("v0.44.1", false), ("v0.44.0", false)]);
        let profile = fixtures::debian();
        let spec = VersionChoiceSpec::Dynamic {
            label: None,
            github_repo: "jesseduffield/lazygit".into(),
            max_versions: Some(5),
            include_prerelease: true,
        };

        let ctx = fx.ctx(&profile);
        let version = resolve_version(&spec, &ctx);
        assert_eq!(version.options.len(), 3);
        assert!(version.options[0].prerelease);
        assert!(version.options[0].warning.is_some());
        assert_eq!(version.default, "v0.44.1");

        resolve_version(&spec, &ctx);
        assert_eq!(fx.feed.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dynamic_versions_degrade_to_latest() {
        let mut fx = Fixture::new();
        fx.feed = FakeFeed::failing();
        let profile = fixtures::debian();
        let res = resolve_choices("lazygit", &tool("lazygit"), &fx.ctx(&profile));
        let version = res.version.unwrap();
        assert_eq!(version.options.len(), 1);
        assert_eq!(version.default, "latest");
        assert!(version.fetch_error.unwrap().contains("unreachable"));
    }

    #[test]
    fn input_conditions() {
        let profile = fixtures::debian();
        let input: InputSpec = serde_json::from_value(serde_json::json!({
            "id": "arch", "label": "Arch",
            "condition": {"choice": "backend", "not_equals": "cpu"}
        }))
        .unwrap();
        let answers = |v: &str| BTreeMap::from([("backend".to_string(), v.to_string())]);
        assert!(!input_applies(&input, &answers("cpu"), &profile));
        assert!(input_applies(&input, &answers("cuda"), &profile));

        let gated: InputSpec = serde_json::from_value(serde_json::json!({
            "id": "unit", "label": "Unit", "condition": {"profile": "has_openrc"}
        }))
        .unwrap();
        assert!(!input_applies(&gated, &BTreeMap::new(), &profile));
    }
}
