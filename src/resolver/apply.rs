//! Flattening a recipe under the user's answers.
//!
//! `apply_choices` picks the `install_variants` branch for each choice
//! answer. `apply_inputs` then substitutes `{name}` placeholders in every
//! string of the recipe. Only known names are replaced, so literal braces
//! (JSON templates, regex quantifiers) pass through untouched.

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use crate::error::ResolutionError;
use crate::profile::SystemProfile;
use crate::recipe::{CommandSpec, CommandStepSpec, InputKind, InputSpec, InstallSpec, ToolRecipe};
use crate::risk::RiskLevel;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*)\}").expect("valid placeholder regex"));

/// Answers keyed by choice id, input id, or `version`.
pub type Answers = BTreeMap<String, String>;

/// Values every recipe may reference without declaring them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Builtins {
    pub user: String,
    pub home: String,
    pub arch: String,
    pub nproc: String,
}

impl Builtins {
    /// Read from the profile, falling back to the current process.
    pub fn detect(profile: &SystemProfile) -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .unwrap_or_else(|_| "root".to_string());
        let home = dirs::home_dir()
            .map(|h| h.display().to_string())
            .unwrap_or_else(|| "/root".to_string());
        let arch = if profile.hardware.arch.is_empty() {
            normalize_arch(std::env::consts::ARCH).to_string()
        } else {
            normalize_arch(&profile.hardware.arch).to_string()
        };
        let nproc = if profile.hardware.cpu_cores > 0 {
            profile.hardware.cpu_cores as usize
        } else {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        };
        Self {
            user,
            home,
            arch,
            nproc: nproc.to_string(),
        }
    }

    fn insert_into(&self, values: &mut BTreeMap<String, String>) {
        values.insert("user".into(), self.user.clone());
        values.insert("home".into(), self.home.clone());
        values.insert("arch".into(), self.arch.clone());
        values.insert("nproc".into(), self.nproc.clone());
    }
}

/// Debian-style architecture names, which most download URLs use.
pub fn normalize_arch(arch: &str) -> &str {
    match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "armv7l" => "armhf",
        other => other,
    }
}

/// Replace known `{name}` placeholders in `text`.
pub fn substitute(text: &str, values: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &regex::Captures<'_>| {
            values
                .get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Placeholder names still present in `text`.
pub fn placeholders(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

fn substitute_value(value: &mut Value, values: &BTreeMap<String, String>) {
    match value {
        Value::String(s) => {
            if s.contains('{') {
                *s = substitute(s, values);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| substitute_value(v, values)),
        Value::Object(map) => map.values_mut().for_each(|v| substitute_value(v, values)),
        _ => {}
    }
}

/// Substitute placeholders in every string leaf of a serializable value.
pub fn substitute_all<T: Serialize + DeserializeOwned>(
    item: &T,
    values: &BTreeMap<String, String>,
) -> serde_json::Result<T> {
    let mut value = serde_json::to_value(item)?;
    substitute_value(&mut value, values);
    serde_json::from_value(value)
}

/// Render an input default as text.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Check a supplied value against its input declaration.
pub fn validate_input(input: &InputSpec, value: &str) -> Result<(), String> {
    match input.kind {
        InputKind::Number => {
            let n: f64 = value
                .trim()
                .parse()
                .map_err(|_| format!("{} must be a number, got '{}'", input.id, value))?;
            if let Some(min) = input.min {
                if n < min {
                    return Err(format!("{} must be at least {}", input.id, min));
                }
            }
            if let Some(max) = input.max {
                if n > max {
                    return Err(format!("{} must be at most {}", input.id, max));
                }
            }
        }
        InputKind::Bool => {
            if !matches!(value, "true" | "false" | "yes" | "no" | "1" | "0") {
                return Err(format!("{} must be true or false, got '{}'", input.id, value));
            }
        }
        InputKind::Select => {
            if !input.options.iter().any(|o| o == value) {
                return Err(format!(
                    "{} must be one of {}, got '{}'",
                    input.id,
                    input.options.join(", "),
                    value
                ));
            }
        }
        InputKind::Text | InputKind::Path | InputKind::Secret => {}
    }
    if let Some(pattern) = &input.pattern {
        let re = Regex::new(pattern).map_err(|e| format!("{}: bad pattern: {}", input.id, e))?;
        if !re.is_match(value) {
            return Err(format!("{} must match {}, got '{}'", input.id, pattern, value));
        }
    }
    Ok(())
}

/// Build the placeholder table: built-ins, then input defaults, then
/// answers. Defaults may themselves reference built-ins.
pub fn placeholder_values(
    inputs: &[InputSpec],
    answers: &Answers,
    builtins: &Builtins,
    version: Option<&str>,
) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    builtins.insert_into(&mut values);
    if let Some(v) = version {
        values.insert("version".into(), v.to_string());
    }
    for input in inputs {
        if let Some(default) = &input.default {
            let text = substitute(&value_text(default), &values);
            values.insert(input.id.clone(), text);
        }
    }
    for (k, v) in answers {
        values.insert(k.clone(), v.clone());
    }
    values
}

/// A recipe after choices are applied.
#[derive(Debug, Clone)]
pub struct Flattened {
    pub tool: ToolRecipe,
    /// Risk of the chosen options/variants, applied to the install steps.
    pub install_risk: Option<RiskLevel>,
    /// A variant replaced the install with a direct step sequence.
    pub direct_steps: Option<Vec<CommandStepSpec>>,
    /// Choice id → selected option.
    pub selected: BTreeMap<String, String>,
}

/// Apply choice answers. Unanswered choices take their declared default
/// (or first option).
pub fn apply_choices(
    tool_id: &str,
    tool: &ToolRecipe,
    answers: &Answers,
) -> Result<Flattened, ResolutionError> {
    let invalid = |message: String| ResolutionError::InvalidAnswer {
        tool: tool_id.to_string(),
        message,
    };

    for key in answers.keys() {
        let known = key == "version"
            || tool.choices.iter().any(|c| &c.id == key)
            || tool.inputs.iter().any(|i| &i.id == key);
        if !known {
            return Err(invalid(format!("unknown choice or input '{}'", key)));
        }
    }

    let mut flat = tool.clone();
    let mut install_risk: Option<RiskLevel> = None;
    let mut direct_steps = None;
    let mut selected = BTreeMap::new();

    for choice in &tool.choices {
        let option = match answers.get(&choice.id) {
            Some(answer) => choice
                .options
                .iter()
                .find(|o| &o.id == answer)
                .ok_or_else(|| {
                    invalid(format!("'{}' is not an option of '{}'", answer, choice.id))
                })?,
            None => match choice
                .options
                .iter()
                .find(|o| o.default)
                .or_else(|| choice.options.first())
            {
                Some(o) => o,
                None => continue,
            },
        };
        selected.insert(choice.id.clone(), option.id.clone());
        install_risk = max_risk(install_risk, option.risk);

        let Some(variant) = tool.install_variants.get(&option.id) else {
            continue;
        };
        install_risk = max_risk(install_risk, variant.risk);

        if !variant.steps.is_empty() {
            direct_steps = Some(variant.steps.clone());
        } else if let Some(command) = &variant.command {
            let needs_sudo = variant
                .needs_sudo
                .unwrap_or_else(|| tool.needs_sudo.values().any(|v| *v));
            flat.install = BTreeMap::from([(
                "_default".to_string(),
                InstallSpec::Command(command.clone()),
            )]);
            flat.needs_sudo = BTreeMap::from([("_default".to_string(), needs_sudo)]);
            flat.prefer.clear();
            flat.repo_setup.clear();
        }
        if let Some(verify) = &variant.verify {
            flat.base.verify = Some(verify.clone());
        }
        if let Some(post) = &variant.post_install {
            flat.post_install = post.clone();
        }
        if variant.post_env.is_some() {
            flat.post_env = variant.post_env.clone();
        }
        if let Some(requires) = &variant.requires {
            flat.requires = requires.clone();
        }
    }

    Ok(Flattened {
        tool: flat,
        install_risk,
        direct_steps,
        selected,
    })
}

fn max_risk(a: Option<RiskLevel>, b: Option<RiskLevel>) -> Option<RiskLevel> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, None) => x,
        (None, y) => y,
    }
}

/// Default version for a tool when none is answered.
pub fn default_version(tool: &ToolRecipe) -> Option<String> {
    use crate::recipe::VersionChoiceSpec;
    match tool.version_choice.as_ref()? {
        VersionChoiceSpec::Static { options, .. } => options
            .iter()
            .find(|o| o.default)
            .or_else(|| options.first())
            .map(|o| o.id.clone()),
        VersionChoiceSpec::PackageManager { .. } | VersionChoiceSpec::Dynamic { .. } => {
            Some("latest".to_string())
        }
    }
}

/// Validate input answers and substitute every placeholder in the recipe
/// and in a direct step sequence.
pub fn apply_inputs(
    tool_id: &str,
    flat: Flattened,
    answers: &Answers,
    builtins: &Builtins,
) -> Result<Flattened, ResolutionError> {
    let invalid = |message: String| ResolutionError::InvalidAnswer {
        tool: tool_id.to_string(),
        message,
    };

    for input in &flat.tool.inputs {
        if let Some(value) = answers.get(&input.id) {
            validate_input(input, value).map_err(invalid)?;
        }
    }

    let version = answers
        .get("version")
        .cloned()
        .or_else(|| default_version(&flat.tool));
    let values = placeholder_values(&flat.tool.inputs, answers, builtins, version.as_deref());

    let tool = substitute_all(&flat.tool, &values).map_err(|e| invalid(e.to_string()))?;
    let direct_steps = match &flat.direct_steps {
        Some(steps) => Some(substitute_all(steps, &values).map_err(|e| invalid(e.to_string()))?),
        None => None,
    };

    Ok(Flattened {
        tool,
        direct_steps,
        ..flat
    })
}

/// Substitute placeholders in a bare argv.
pub fn substitute_command(command: &CommandSpec, values: &BTreeMap<String, String>) -> CommandSpec {
    command.iter().map(|arg| substitute(arg, values)).collect()
}
