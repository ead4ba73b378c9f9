//! Install-method sniffing from stderr.

use regex::Regex;
use std::sync::LazyLock;

static KEYWORDS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\bcargo\b|\brustc\b|crates\.io", "cargo"),
        (r"\bpip3?\b|site-packages|PyPI", "pip"),
        (r"\bnpm\b|node_modules", "npm"),
        (r"\bapt(-get)?\b|\bdpkg\b", "apt"),
        (r"\bdnf\b", "dnf"),
        (r"\bsnap\b|snapd", "snap"),
        (r"\bbrew\b|Homebrew", "brew"),
    ]
    .into_iter()
    .map(|(pattern, method)| {
        let re = Regex::new(&format!("(?i){}", pattern)).expect("method keyword must compile");
        (re, method)
    })
    .collect()
});

/// Guess which install method produced `stderr`.
///
/// Only a fallback for when the plan did not record its method.
pub fn infer_method(stderr: &str) -> Option<String> {
    KEYWORDS
        .iter()
        .find(|(re, _)| re.is_match(stderr))
        .map(|(_, method)| method.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_common_tools() {
        assert_eq!(
            infer_method("error: failed to compile `cargo-outdated v0.15.0`").as_deref(),
            Some("cargo")
        );
        assert_eq!(
            infer_method("E: dpkg was interrupted, you must manually run 'dpkg --configure -a'").as_deref(),
            Some("apt")
        );
        assert_eq!(infer_method("npm ERR! code EACCES").as_deref(), Some("npm"));
        assert_eq!(infer_method("Error: No such keg: /opt/homebrew/Cellar/x").as_deref(), Some("brew"));
        assert_eq!(infer_method("segmentation fault"), None);
    }
}
