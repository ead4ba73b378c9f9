//! Remediation from a recipe's own `on_failure` handlers.

use regex::RegexBuilder;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{FailureContext, RemediationOption, RemediationService};
use crate::recipe::{FailureCategory, FailureHandler, RecipeCatalog, RemediationSpec, Strategy};
use crate::resolver::condition::holds;

/// Matches failures against the failing tool's `on_failure` handlers.
pub struct RecipeHandlers {
    catalog: Arc<RecipeCatalog>,
}

impl RecipeHandlers {
    pub fn new(catalog: Arc<RecipeCatalog>) -> Self {
        Self { catalog }
    }
}

fn handler_matches(handler: &FailureHandler, ctx: &FailureContext) -> bool {
    if let Some(code) = handler.exit_code {
        if ctx.exit_code != Some(code) {
            return false;
        }
    }
    match RegexBuilder::new(&handler.pattern).case_insensitive(true).build() {
        Ok(re) => re.is_match(&ctx.stderr),
        Err(e) => {
            warn!("Handler '{}' has a bad pattern: {}", handler.label, e);
            false
        }
    }
}

fn category_name(category: FailureCategory) -> Option<String> {
    serde_json::to_value(category)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
}

/// Why `spec` cannot be used here, if it cannot.
fn unavailable_reason(spec: &RemediationSpec, ctx: &FailureContext, method: Option<&str>) -> Option<String> {
    if let Some(unmet) = spec.requires.iter().find(|c| !holds(**c, &ctx.profile)) {
        let name = serde_json::to_value(unmet)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_default();
        return Some(format!("Requires {}", name));
    }
    let target = match &spec.strategy {
        Strategy::SwitchMethod { method } => Some(method),
        Strategy::InstallDepThenSwitch { switch_to, .. } => Some(switch_to),
        _ => None,
    };
    match (target, method) {
        (Some(target), Some(current)) if target == current => {
            Some(format!("Already using {}", current))
        }
        _ => None,
    }
}

impl RemediationService for RecipeHandlers {
    fn remediate(&self, ctx: &FailureContext) -> Vec<RemediationOption> {
        let Some(tool) = self.catalog.tool(&ctx.tool) else {
            return Vec::new();
        };
        let method = ctx.effective_method();

        let options: Vec<RemediationOption> = tool
            .on_failure
            .iter()
            .filter(|h| handler_matches(h, ctx))
            .flat_map(|handler| {
                let method = method.as_deref();
                handler.options.iter().map(move |spec| {
                    let reason = unavailable_reason(spec, ctx, method);
                    RemediationOption {
                        id: spec.id.clone(),
                        label: spec.label.clone(),
                        strategy: spec.strategy.name().to_string(),
                        risk: spec.risk,
                        recommended: spec.recommended,
                        description: spec.description.clone(),
                        handler: Some(handler.label.clone()),
                        category: category_name(handler.category),
                        available: reason.is_none(),
                        unavailable_reason: reason,
                    }
                })
            })
            .collect();
        debug!("{} remediation option(s) for {}", options.len(), ctx.tool);
        options
    }
}
