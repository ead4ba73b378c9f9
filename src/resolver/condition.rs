//! Profile conditions and hardware predicates.

use serde_json::Value;

use crate::profile::{ProfileKey, ProfileValue, SystemProfile};
use crate::recipe::Condition;

/// Evaluate a named condition against the profile.
pub fn holds(condition: Condition, profile: &SystemProfile) -> bool {
    match condition {
        Condition::HasSystemd => profile.capabilities.has_systemd,
        Condition::HasOpenrc => profile.capabilities.has_openrc,
        Condition::IsLinux => profile.is_linux(),
        Condition::NotContainer => !profile.container.in_container,
        Condition::WritableRootfs => profile.writable_rootfs(),
        Condition::NotRoot => !profile.capabilities.is_root,
        Condition::HasSudo => profile.capabilities.has_sudo,
    }
}

/// `None` holds.
pub fn holds_opt(condition: Option<Condition>, profile: &SystemProfile) -> bool {
    condition.is_none_or(|c| holds(c, profile))
}

/// Check one `hardware` predicate. Returns the failure reason when it does
/// not hold.
///
/// - a bool expects equality
/// - a number expects numeric equality
/// - a `">=N"` string expects a numeric value at least `N`
/// - any other string expects text equality
pub fn check_predicate(profile: &SystemProfile, key: &str, expected: &Value) -> Result<(), String> {
    let parsed: ProfileKey = key.parse()?;
    let actual = parsed.read(profile);

    match expected {
        Value::Bool(want) => match actual.as_bool() {
            Some(have) if have == *want => Ok(()),
            _ => Err(format!("Requires {} = {} (found {})", key, want, actual)),
        },
        Value::Number(n) => {
            let want = n.as_f64().unwrap_or(f64::NAN);
            match actual.as_number() {
                Some(have) if (have - want).abs() < f64::EPSILON => Ok(()),
                _ => Err(format!("Requires {} = {} (found {})", key, want, actual)),
            }
        }
        Value::String(s) => {
            if let Some(min) = s.trim().strip_prefix(">=") {
                let min: f64 = min
                    .trim()
                    .parse()
                    .map_err(|_| format!("Invalid comparison '{}' for {}", s, key))?;
                match actual.as_number() {
                    Some(have) if have >= min => Ok(()),
                    Some(have) => Err(format!("Requires {} >= {} (found {})", key, min, have)),
                    None => Err(format!("Requires {} >= {} (not detected)", key, min)),
                }
            } else {
                match &actual {
                    ProfileValue::Text(have) if have == s => Ok(()),
                    _ => Err(format!("Requires {} = {} (found {})", key, s, actual)),
                }
            }
        }
        other => Err(format!("Unsupported predicate {} for {}", other, key)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::fixtures;
    use serde_json::json;

    #[test]
    fn conditions_follow_capabilities() {
        let debian = fixtures::debian();
        assert!(holds(Condition::HasSystemd, &debian));
        assert!(holds(Condition::NotRoot, &debian));
        assert!(holds(Condition::NotContainer, &debian));

        let alpine = fixtures::alpine_container();
        assert!(!holds(Condition::HasSystemd, &alpine));
        assert!(holds(Condition::HasOpenrc, &alpine));
        assert!(!holds(Condition::NotRoot, &alpine));
        assert!(!holds(Condition::NotContainer, &alpine));
        assert!(holds_opt(None, &alpine));
    }

    #[test]
    fn bool_predicate() {
        let mut profile = fixtures::debian();
        assert!(check_predicate(&profile, "gpu.nvidia.present", &json!(true)).is_err());
        profile.hardware.gpu.nvidia.present = true;
        assert!(check_predicate(&profile, "gpu.nvidia.present", &json!(true)).is_ok());
    }

    #[test]
    fn gte_predicate_on_version_text() {
        let mut profile = fixtures::debian();
        profile.hardware.gpu.nvidia.runtime_version = Some("12.4.1".into());
        assert!(check_predicate(&profile, "gpu.nvidia.cuda_version", &json!(">=12.1")).is_ok());

        profile.hardware.gpu.nvidia.runtime_version = Some("11.8".into());
        let reason =
            check_predicate(&profile, "gpu.nvidia.cuda_version", &json!(">=12.1")).unwrap_err();
        assert!(reason.contains(">= 12.1"));
    }

    #[test]
    fn missing_value_fails_gte() {
        let profile = fixtures::debian();
        let reason =
            check_predicate(&profile, "gpu.nvidia.compute_capability", &json!(">=7.5"))
                .unwrap_err();
        assert!(reason.contains("not detected"));
    }

    #[test]
    fn numeric_and_text_equality() {
        let profile = fixtures::debian();
        assert!(check_predicate(&profile, "cpu_cores", &json!(8)).is_ok());
        assert!(check_predicate(&profile, "arch", &json!("amd64")).is_ok());
        assert!(check_predicate(&profile, "arch", &json!("arm64")).is_err());
    }

    #[test]
    fn unknown_key_is_a_reason() {
        let profile = fixtures::debian();
        let reason = check_predicate(&profile, "gpu.voodoo.present", &json!(true)).unwrap_err();
        assert!(reason.contains("voodoo"));
    }
}
