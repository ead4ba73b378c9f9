//! Plan resolution.
//!
//! The [`Resolver`] turns a recipe and a [`SystemProfile`] into a [`Plan`].
//! It owns the live probes (PATH, network, release feeds) and the short-TTL
//! caches in front of them; everything else is pure.
//!
//! # Modules
//!
//! - [`method`] - Install method precedence
//! - [`deps`] - Depth-first dependency collection and package batching
//! - [`choices`] - Option availability, version lists, input conditions
//! - [`apply`] - Flattening choices and substituting inputs
//! - [`source`] - Build-from-source expansion
//! - [`plan`] - Ordered assembly, risk gate, version constraints

pub mod apply;
pub mod cache;
pub mod choices;
pub mod condition;
pub mod deps;
pub mod method;
pub mod network;
pub mod plan;
pub mod source;
pub mod versions;

pub use apply::{Answers, Builtins};
pub use cache::TtlCache;
pub use choices::{ChoiceResolution, ResolvedChoice, ResolvedOption, ResolvedVersion};
pub use method::{pick_install_method, pick_method_command, MethodContext};
pub use network::{HttpProbe, NetworkProbe};
pub use plan::{ConstraintCheck, Plan};
pub use versions::{GithubReleases, Release, ReleaseFeed};

use chrono::Utc;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ResolutionError;
use crate::profile::{Host, LiveHost, SystemProfile};
use crate::recipe::{ConfigRecipe, DataPackRecipe, Recipe, RecipeCatalog, ToolRecipe};
use crate::steps::{ConfigAction, ConfigStep, Step, StepAction};
use apply::{apply_choices, apply_inputs, placeholder_values, substitute_all, Flattened};
use choices::ChoiceContext;
use deps::{cli_name, Collector};
use plan::{assemble, check_constraint, verify_step, AssemblyInput};

/// Reachability answers are reused for this many seconds.
pub const REACHABILITY_TTL_SECS: i64 = 60;

/// Release listings are reused for this many seconds.
pub const VERSION_TTL_SECS: i64 = 600;

/// The catalog seen through an override layer.
///
/// Overrides shadow catalog entries for the duration of one resolution;
/// the catalog itself is never modified.
pub struct RecipeView<'a> {
    catalog: &'a RecipeCatalog,
    overrides: &'a BTreeMap<String, Recipe>,
}

impl<'a> RecipeView<'a> {
    pub fn new(catalog: &'a RecipeCatalog, overrides: &'a BTreeMap<String, Recipe>) -> Self {
        Self { catalog, overrides }
    }

    pub fn get(&self, id: &str) -> Option<&'a Recipe> {
        self.overrides.get(id).or_else(|| self.catalog.get(id))
    }

    pub fn tool(&self, id: &str) -> Option<&'a ToolRecipe> {
        self.get(id).and_then(Recipe::as_tool)
    }
}

/// Resolves recipes into plans against a machine profile.
pub struct Resolver {
    catalog: Arc<RecipeCatalog>,
    host: Box<dyn Host>,
    probe: Box<dyn NetworkProbe>,
    feed: Box<dyn ReleaseFeed>,
    reachability: TtlCache<String, bool>,
    versions: TtlCache<String, Vec<Release>>,
    builtins: Option<Builtins>,
}

impl Resolver {
    /// A resolver probing the real machine and network.
    pub fn new(catalog: Arc<RecipeCatalog>) -> Self {
        Self {
            catalog,
            host: Box::new(LiveHost::new()),
            probe: Box::new(HttpProbe::new()),
            feed: Box::new(GithubReleases::new()),
            reachability: TtlCache::new(REACHABILITY_TTL_SECS),
            versions: TtlCache::new(VERSION_TTL_SECS),
            builtins: None,
        }
    }

    pub fn with_host(mut self, host: Box<dyn Host>) -> Self {
        self.host = host;
        self
    }

    pub fn with_probe(mut self, probe: Box<dyn NetworkProbe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_feed(mut self, feed: Box<dyn ReleaseFeed>) -> Self {
        self.feed = feed;
        self
    }

    /// Fix `{user}`/`{home}`/`{arch}`/`{nproc}` instead of detecting them.
    pub fn with_builtins(mut self, builtins: Builtins) -> Self {
        self.builtins = Some(builtins);
        self
    }

    pub fn catalog(&self) -> &RecipeCatalog {
        &self.catalog
    }

    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    fn builtins(&self, profile: &SystemProfile) -> Builtins {
        self.builtins
            .clone()
            .unwrap_or_else(|| Builtins::detect(profile))
    }

    fn recipe(&self, tool_id: &str) -> Result<&Recipe, ResolutionError> {
        self.catalog
            .get(tool_id)
            .ok_or_else(|| ResolutionError::UnknownTool {
                tool: tool_id.to_string(),
            })
    }

    fn is_installed(&self, tool_id: &str, tool: &ToolRecipe) -> bool {
        self.host.has_binary(cli_name(tool_id, tool))
    }

    /// The open decisions for a recipe on this machine.
    pub fn resolve_choices(
        &self,
        tool_id: &str,
        profile: &SystemProfile,
    ) -> Result<ChoiceResolution, ResolutionError> {
        let recipe = self.recipe(tool_id)?;
        let tool = match recipe {
            Recipe::Tool(tool) => tool,
            Recipe::DataPack(pack) => {
                let mut res = ChoiceResolution::already_installed(tool_id);
                res.auto_resolve = false;
                res.inputs = pack.inputs.clone();
                return Ok(res);
            }
            Recipe::Config(config) => {
                let mut res = ChoiceResolution::already_installed(tool_id);
                res.auto_resolve = false;
                res.inputs = config
                    .config_templates
                    .iter()
                    .flat_map(|t| t.inputs.iter().cloned())
                    .collect();
                return Ok(res);
            }
        };

        if self.is_installed(tool_id, tool) {
            return Ok(ChoiceResolution::already_installed(tool_id));
        }

        Ok(choices::resolve_choices(tool_id, tool, &self.choice_context(profile)))
    }

    fn choice_context<'a>(&'a self, profile: &'a SystemProfile) -> ChoiceContext<'a> {
        ChoiceContext {
            profile,
            host: self.host.as_ref(),
            probe: self.probe.as_ref(),
            reachability: &self.reachability,
            feed: self.feed.as_ref(),
            versions: &self.versions,
            now: Utc::now(),
        }
    }

    /// Fill unanswered choices with the default `resolve_choices` would
    /// offer, which skips unavailable options.
    fn with_resolved_defaults(&self, tool: &ToolRecipe, profile: &SystemProfile, answers: &Answers) -> Answers {
        let mut answers = answers.clone();
        let unanswered: Vec<_> = tool
            .choices
            .iter()
            .filter(|c| !answers.contains_key(&c.id))
            .collect();
        if unanswered.is_empty() {
            return answers;
        }
        let ctx = self.choice_context(profile);
        for choice in unanswered {
            if let Some(default) = choices::resolve_choice(choice, &ctx).default {
                answers.insert(choice.id.clone(), default);
            }
        }
        answers
    }

    /// Resolve a plan using recipe defaults.
    pub fn resolve_install_plan(
        &self,
        tool_id: &str,
        profile: &SystemProfile,
    ) -> Result<Plan, ResolutionError> {
        let recipe = self.recipe(tool_id)?;
        match recipe {
            Recipe::Tool(tool) => {
                if self.is_installed(tool_id, tool) {
                    return Ok(Plan::already_installed(tool_id, &tool.base, "tool"));
                }
                let flat = Flattened {
                    tool: tool.clone(),
                    install_risk: None,
                    direct_steps: None,
                    selected: BTreeMap::new(),
                };
                let answers = Answers::new();
                let flat = apply_inputs(tool_id, flat, &answers, &self.builtins(profile))?;
                self.resolve_flattened(tool_id, profile, flat, &answers)
            }
            Recipe::DataPack(pack) => self.data_pack_plan(tool_id, pack, profile, &Answers::new()),
            Recipe::Config(config) => self.config_plan(tool_id, config, &Answers::new()),
        }
    }

    /// Resolve a plan after applying choice and input answers.
    pub fn resolve_install_plan_with_choices(
        &self,
        tool_id: &str,
        profile: &SystemProfile,
        answers: &Answers,
    ) -> Result<Plan, ResolutionError> {
        let recipe = self.recipe(tool_id)?;
        let tool = match recipe {
            Recipe::Tool(tool) => tool,
            Recipe::DataPack(pack) => return self.data_pack_plan(tool_id, pack, profile, answers),
            Recipe::Config(config) => return self.config_plan(tool_id, config, answers),
        };
        if self.is_installed(tool_id, tool) {
            return Ok(Plan::already_installed(tool_id, &tool.base, "tool"));
        }

        let flat = apply_choices(tool_id, tool, &self.with_resolved_defaults(tool, profile, answers))?;
        let flat = apply_inputs(tool_id, flat, answers, &self.builtins(profile))?;
        debug!("{}: selected {:?}", tool_id, flat.selected);

        if let Some(direct) = &flat.direct_steps {
            return Ok(self.direct_plan(tool_id, &flat, direct, profile, answers));
        }
        self.resolve_flattened(tool_id, profile, flat, answers)
    }

    /// A variant that is its own step sequence: no dependency collection.
    fn direct_plan(
        &self,
        tool_id: &str,
        flat: &Flattened,
        direct: &[crate::recipe::CommandStepSpec],
        profile: &SystemProfile,
        answers: &Answers,
    ) -> Plan {
        let mut steps: Vec<Step> = direct
            .iter()
            .filter(|spec| condition::holds_opt(spec.condition, profile))
            .map(|spec| {
                let mut step = Step::from_spec(
                    spec,
                    StepAction::Tool {
                        command: spec.command.clone(),
                        script_sha256: spec.script_sha256.clone(),
                        cwd: None,
                    },
                )
                .with_tool(tool_id);
                step.risk = step.risk.or(flat.install_risk);
                step
            })
            .collect();
        if let Some(verify) = &flat.tool.base.verify {
            steps.push(verify_step(tool_id, &flat.tool.base, verify, None));
        }

        let mut plan = Plan::from_steps(tool_id, &flat.tool.base, "tool", steps);
        plan.version_constraint = self.constraint_for(&flat.tool, profile, answers);
        plan
    }

    /// Resolve a flattened tool through the override layer.
    fn resolve_flattened(
        &self,
        tool_id: &str,
        profile: &SystemProfile,
        flat: Flattened,
        answers: &Answers,
    ) -> Result<Plan, ResolutionError> {
        let overrides = BTreeMap::from([(tool_id.to_string(), Recipe::Tool(flat.tool))]);
        let view = RecipeView::new(&self.catalog, &overrides);
        let tool = view.tool(tool_id).ok_or_else(|| ResolutionError::UnknownTool {
            tool: tool_id.to_string(),
        })?;

        let mut collector = Collector::new(&view, profile, self.host.as_ref(), tool_id);
        collector.collect(tool_id)?;
        let collection = collector.collection;

        let recipes = collection
            .installed
            .iter()
            .filter_map(|id| view.tool(id).map(|t| (id.clone(), t)))
            .collect();
        let builtins = self.builtins(profile);
        let input = AssemblyInput {
            tool_id,
            tool,
            profile,
            builtins: &builtins,
            recipes,
            install_risk: flat.install_risk,
        };
        let (steps, warning) = assemble(&input, &collection);

        let mut plan = Plan::from_steps(tool_id, &tool.base, "tool", steps);
        plan.method = collection.method_of(tool_id).map(str::to_string);
        plan.warning = warning;
        plan.version_constraint = self.constraint_for(tool, profile, answers);
        info!(
            "Resolved {} into {} step(s), risk {}",
            tool_id,
            plan.steps.len(),
            plan.risk_summary.level
        );
        Ok(plan)
    }

    fn constraint_for(
        &self,
        tool: &ToolRecipe,
        profile: &SystemProfile,
        answers: &Answers,
    ) -> Option<ConstraintCheck> {
        let constraint = tool.base.version_constraint.as_ref()?;
        let candidate = answers
            .get("version")
            .cloned()
            .or_else(|| apply::default_version(tool));
        Some(check_constraint(constraint, profile, candidate.as_deref()))
    }

    fn data_pack_plan(
        &self,
        pack_id: &str,
        pack: &DataPackRecipe,
        profile: &SystemProfile,
        answers: &Answers,
    ) -> Result<Plan, ResolutionError> {
        let invalid = |message: String| ResolutionError::InvalidAnswer {
            tool: pack_id.to_string(),
            message,
        };
        for input in &pack.inputs {
            if let Some(value) = answers.get(&input.id) {
                apply::validate_input(input, value).map_err(invalid)?;
            }
        }
        let values = placeholder_values(&pack.inputs, answers, &self.builtins(profile), None);
        let steps: Vec<Step> = pack
            .steps
            .iter()
            .map(|s| -> Result<Step, ResolutionError> {
                let mut step = substitute_all(s, &values)
                    .map_err(|e| invalid(e.to_string()))?
                    .with_tool(pack_id);
                if let StepAction::Download(download) = &mut step.action {
                    download.data_pack_id.get_or_insert_with(|| pack_id.to_string());
                }
                Ok(step)
            })
            .collect::<Result<_, _>>()?;
        Ok(Plan::from_steps(pack_id, &pack.base, "data_pack", steps))
    }

    fn config_plan(
        &self,
        config_id: &str,
        config: &ConfigRecipe,
        answers: &Answers,
    ) -> Result<Plan, ResolutionError> {
        let steps = config
            .config_templates
            .iter()
            .map(|template| {
                let values: BTreeMap<String, Value> = template
                    .inputs
                    .iter()
                    .filter_map(|i| {
                        answers
                            .get(&i.id)
                            .map(|v| (i.id.clone(), Value::String(v.clone())))
                    })
                    .collect();
                Step::new(
                    format!("Write {}", template.file),
                    StepAction::Config(ConfigStep {
                        path: template.file.clone(),
                        action: ConfigAction::Template {
                            template: template.template.clone(),
                            inputs: template.inputs.clone(),
                            values,
                            format: template.format,
                        },
                        mode: template.mode.clone(),
                        owner: template.owner.clone(),
                        post_command: template.post_command.clone(),
                    }),
                )
                .with_sudo(template.needs_sudo)
                .with_tool(config_id)
            })
            .collect();
        Ok(Plan::from_steps(config_id, &config.base, "config", steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::fixtures;
    use crate::profile::host::fake::FakeHost;
    use crate::resolver::network::fake::FakeProbe;
    use crate::resolver::versions::fake::FakeFeed;
    use crate::risk::RiskLevel;
    use std::path::Path;

    fn resolver(host: FakeHost) -> Resolver {
        let catalog = Arc::new(RecipeCatalog::builtin().unwrap());
        Resolver::new(catalog)
            .with_host(Box::new(host))
            .with_probe(Box::new(FakeProbe::default()))
            .with_feed(Box::new(FakeFeed::failing()))
            .with_builtins(Builtins {
                user: "ada".into(),
                home: "/home/ada".into(),
                arch: "amd64".into(),
                nproc: "8".into(),
            })
    }

    fn kinds(plan: &Plan) -> Vec<&str> {
        plan.steps.iter().map(|s| s.kind()).collect()
    }

    #[test]
    fn cargo_outdated_on_bare_debian() {
        let plan = resolver(FakeHost::empty())
            .resolve_install_plan("cargo-outdated", &fixtures::debian())
            .unwrap();

        assert_eq!(kinds(&plan), vec!["packages", "tool", "tool", "verify"]);
        let StepAction::Packages { packages, command, .. } = &plan.steps[0].action else {
            panic!("expected packages step");
        };
        assert_eq!(command[0], "apt-get");
        for pkg in ["pkg-config", "libssl-dev", "libcurl4-openssl-dev"] {
            assert!(packages.contains(&pkg.to_string()));
        }
        assert_eq!(
            plan.steps[2].command().unwrap(),
            &vec!["cargo".to_string(), "install".into(), "cargo-outdated".into()]
        );
        assert!(plan.steps[2].post_env.as_deref().unwrap().contains(".cargo/bin"));
        assert_eq!(
            plan.steps[3].command().unwrap(),
            &vec!["cargo".to_string(), "outdated".into(), "--version".into()]
        );
        assert_eq!(plan.method.as_deref(), Some("cargo"));
    }

    #[test]
    fn already_installed_short_circuits() {
        let plan = resolver(FakeHost::with_binaries(&["docker"]))
            .resolve_install_plan("docker", &fixtures::debian())
            .unwrap();
        assert!(plan.already_installed);
        assert!(plan.steps.is_empty());
    }

    #[test]
    fn docker_post_install_follows_conditions() {
        let r = resolver(FakeHost::empty());
        let plan = r.resolve_install_plan("docker", &fixtures::debian()).unwrap();
        let post: Vec<&Step> = plan.steps.iter().filter(|s| s.kind() == "post_install").collect();
        assert_eq!(post.len(), 3);
        assert_eq!(post[2].label, "Add ada to the docker group");

        let plan = r.resolve_install_plan("docker", &fixtures::alpine_container()).unwrap();
        assert_eq!(plan.indices_of("post_install").len(), 0);
        let StepAction::Packages { command, .. } = &plan.steps[0].action else {
            panic!("expected packages step");
        };
        assert_eq!(command[..2], ["apk", "add"]);
    }

    #[test]
    fn unknown_tool_is_an_error_value() {
        let err = resolver(FakeHost::empty())
            .resolve_install_plan("nope", &fixtures::debian())
            .unwrap_err();
        assert_eq!(err.tool(), "nope");
    }

    #[test]
    fn no_method_lists_unavailable() {
        let mut profile = fixtures::debian();
        profile.package_manager.primary = "xbps".into();
        let err = resolver(FakeHost::empty())
            .resolve_install_plan("git", &profile)
            .unwrap_err();
        let ResolutionError::NoInstallMethod { unavailable, .. } = err else {
            panic!("expected NoInstallMethod");
        };
        assert!(unavailable.contains(&"apt".to_string()));
    }

    #[test]
    fn gh_repo_setup_comes_first() {
        let plan = resolver(FakeHost::empty())
            .resolve_install_plan("gh", &fixtures::debian())
            .unwrap();
        assert_eq!(kinds(&plan), vec!["repo_setup", "packages", "verify"]);
        assert_eq!(plan.confirmation_gate.level(), "single");
    }

    #[test]
    fn multi_step_variant_builds_direct_plan() {
        let mut profile = fixtures::debian();
        profile.hardware.gpu.nvidia.present = true;
        profile.hardware.gpu.nvidia.compute_capability = Some(8.6);
        let answers = Answers::from([("flavor".to_string(), "open".to_string())]);
        let plan = resolver(FakeHost::empty())
            .resolve_install_plan_with_choices("nvidia-driver", &profile, &answers)
            .unwrap();

        assert_eq!(kinds(&plan), vec!["tool", "tool", "tool", "verify"]);
        assert_eq!(plan.confirmation_gate.level(), "double");
        assert!(plan.risk_escalation.is_none(), "recipe already declares high");
    }

    #[test]
    fn variant_command_flows_through_resolver() {
        let answers = Answers::from([("backend".to_string(), "cuda".to_string())]);
        let host = FakeHost::with_binaries(&["pip3"]);
        let plan = resolver(host)
            .resolve_install_plan_with_choices("pytorch", &fixtures::debian(), &answers)
            .unwrap();
        let tool = &plan.steps[plan.indices_of("tool")[0]];
        assert!(tool.command().unwrap().iter().any(|a| a.contains("cu121")));
    }

    #[test]
    fn resolving_with_choices_leaves_catalog_untouched() {
        let r = resolver(FakeHost::with_binaries(&["pip3"]));
        let answers = Answers::from([("backend".to_string(), "cuda".to_string())]);
        r.resolve_install_plan_with_choices("pytorch", &fixtures::debian(), &answers)
            .unwrap();
        let original = r.catalog().tool("pytorch").unwrap();
        assert!(original.install.contains_key("pip"));
        assert!(!original.install.contains_key("_default"));
    }

    #[test]
    fn escalation_when_choice_raises_risk() {
        let answers = Answers::from([("backend".to_string(), "cuda".to_string())]);
        let catalog = RecipeCatalog::builtin().unwrap();
        let mut pytorch = catalog.tool("pytorch").unwrap().clone();
        pytorch.choices[0].options[1].risk = Some(RiskLevel::High);
        let mut flat = apply_choices("pytorch", &pytorch, &answers).unwrap();
        flat.tool.requires.binaries.clear();

        let r = resolver(FakeHost::empty());
        let plan = r
            .resolve_flattened("pytorch", &fixtures::debian(), flat, &answers)
            .unwrap();
        let escalation = plan.risk_escalation.unwrap();
        assert_eq!(escalation.from, RiskLevel::Low);
        assert_eq!(escalation.to, RiskLevel::High);
    }

    #[test]
    fn unanswered_choice_skips_unavailable_default() {
        let yaml = r#"
widget:
  label: Widget
  cli: widget
  install:
    _default: [widget-installer]
  needs_sudo:
    _default: false
  choices:
    - id: flavor
      label: Flavor
      options:
        - id: gpu
          label: GPU build
          default: true
          requires:
            hardware:
              gpu.nvidia.present: true
        - id: plain
          label: Plain build
  install_variants:
    gpu:
      command: [widget-installer, --gpu]
    plain:
      command: [widget-installer, --plain]
"#;
        let catalog = RecipeCatalog::from_yaml_str(yaml, Path::new("widget.yml")).unwrap();
        let r = Resolver::new(Arc::new(catalog))
            .with_host(Box::new(FakeHost::empty()))
            .with_probe(Box::new(FakeProbe::default()))
            .with_feed(Box::new(FakeFeed::failing()));
        let profile = fixtures::debian();

        let offered = r.resolve_choices("widget", &profile).unwrap();
        assert_eq!(offered.choices[0].default.as_deref(), Some("plain"));

        let plan = r
            .resolve_install_plan_with_choices("widget", &profile, &Answers::new())
            .unwrap();
        let text = serde_json::to_string(&plan.steps).unwrap();
        assert!(text.contains("--plain"));
        assert!(!text.contains("--gpu"));
    }

    #[test]
    fn data_pack_substitutes_inputs() {
        let answers = Answers::from([("model_dir".to_string(), "/srv/models".to_string())]);
        let plan = resolver(FakeHost::empty())
            .resolve_install_plan_with_choices("tinyllama-gguf", &fixtures::debian(), &answers)
            .unwrap();
        let StepAction::Download(download) = &plan.steps[0].action else {
            panic!("expected download step");
        };
        assert!(download.dest.starts_with("/srv/models/"));
        assert_eq!(plan.kind, "data_pack");

        let plan = resolver(FakeHost::empty())
            .resolve_install_plan("tinyllama-gguf", &fixtures::debian())
            .unwrap();
        let StepAction::Download(download) = &plan.steps[0].action else {
            panic!("expected download step");
        };
        assert!(download.dest.starts_with("/home/ada/.local/share/models/"));
    }

    #[test]
    fn config_recipe_yields_template_steps() {
        let answers = Answers::from([("storage_driver".to_string(), "zfs".to_string())]);
        let plan = resolver(FakeHost::empty())
            .resolve_install_plan_with_choices("docker-daemon-config", &fixtures::debian(), &answers)
            .unwrap();
        assert_eq!(kinds(&plan), vec!["config"]);
        let StepAction::Config(cfg) = &plan.steps[0].action else {
            panic!("expected config step");
        };
        assert_eq!(cfg.path, "/etc/docker/daemon.json");
        let ConfigAction::Template { values, .. } = &cfg.action else {
            panic!("expected template");
        };
        assert_eq!(values["storage_driver"], "zfs");
    }

    #[test]
    fn kubectl_constraint_is_surfaced() {
        let mut profile = fixtures::debian();
        profile.package_manager.snap_available = true;
        profile.versions.insert("kubernetes".into(), "1.30.1".into());
        let plan = resolver(FakeHost::empty())
            .resolve_install_plan("kubectl", &profile)
            .unwrap();
        let check = plan.version_constraint.unwrap();
        assert_eq!(check.candidate_version.as_deref(), Some("v1.31.0"));
        assert_eq!(check.satisfied, Some(true));
        assert_eq!(plan.method.as_deref(), Some("snap"));
    }
}
