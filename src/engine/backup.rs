//! Timestamped backups taken before a file is changed.

use anyhow::{bail, Context};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::StepContext;

/// `<path>.rigup-backup-<YYYYmmddHHMMSS>`
pub fn backup_name(path: &Path, at: DateTime<Local>) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".rigup-backup-{}", at.format("%Y%m%d%H%M%S")));
    PathBuf::from(name)
}

/// Copy `path` aside if it exists. Returns the backup location.
pub(crate) fn backup_path(ctx: &StepContext<'_>, path: &Path) -> anyhow::Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let dest = backup_name(path, Local::now());

    if path.is_file() && !ctx.use_sudo(ctx.step.needs_sudo) {
        std::fs::copy(path, &dest)
            .with_context(|| format!("copying {} to {}", path.display(), dest.display()))?;
    } else {
        let argv = vec![
            "cp".to_string(),
            "-a".to_string(),
            path.display().to_string(),
            dest.display().to_string(),
        ];
        let result = ctx.run_raw(&argv, ctx.step.needs_sudo, None)?;
        if !result.success {
            bail!(result.error_message());
        }
    }
    debug!("Backed up {} to {}", path.display(), dest.display());
    Ok(Some(dest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::engine;
    use crate::steps::{Step, StepAction};
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn name_carries_timestamp() {
        let at = Local.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(
            backup_name(Path::new("/etc/hosts"), at),
            PathBuf::from("/etc/hosts.rigup-backup-20260304050607")
        );
    }

    #[test]
    fn backs_up_files_and_directories() {
        let dir = TempDir::new().unwrap();
        let engine = engine(&dir);
        let step = Step::new("x", StepAction::Notification { message: String::new() });
        let ctx = StepContext::new(&engine, &step, None, None);

        let file = dir.path().join("settings.conf");
        std::fs::write(&file, "a=1").unwrap();
        let copy = backup_path(&ctx, &file).unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(copy).unwrap(), "a=1");

        let sub = dir.path().join("conf.d");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("x"), "y").unwrap();
        let copy = backup_path(&ctx, &sub).unwrap().unwrap();
        assert!(copy.join("x").exists());

        assert!(backup_path(&ctx, &dir.path().join("missing")).unwrap().is_none());
    }
}
