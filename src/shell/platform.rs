//! Platform-specific shell detection.

use std::path::{Path, PathBuf};

/// Information about the user's login shell.
#[derive(Debug, Clone)]
pub struct ShellInfo {
    /// Shell executable path.
    pub executable: PathBuf,

    /// Shell kind.
    pub name: ShellType,

    /// The rc file new PATH/env lines belong in.
    pub rc_file: Option<PathBuf>,
}

/// Known shell types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellType {
    Bash,
    Zsh,
    Fish,
    Sh,
    Unknown,
}

impl ShellType {
    /// Parse shell type from executable name.
    pub fn from_executable(exe: &str) -> Self {
        let name = Path::new(exe)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        match name.as_str() {
            "bash" => ShellType::Bash,
            "zsh" => ShellType::Zsh,
            "fish" => ShellType::Fish,
            "sh" | "dash" | "ash" => ShellType::Sh,
            _ => ShellType::Unknown,
        }
    }

    /// Convert a POSIX `export` line into this shell's syntax.
    ///
    /// Only fish differs; other lines pass through unchanged.
    pub fn translate_line(&self, line: &str) -> String {
        if *self != ShellType::Fish {
            return line.to_string();
        }
        let Some(rest) = line.trim().strip_prefix("export ") else {
            return line.to_string();
        };
        let Some((name, value)) = rest.split_once('=') else {
            return line.to_string();
        };
        let value = value.trim_matches('"');
        if name == "PATH" {
            let dirs: Vec<&str> = value
                .split(':')
                .filter(|p| *p != "$PATH" && !p.is_empty())
                .collect();
            format!("fish_add_path {}", dirs.join(" "))
        } else {
            format!("set -gx {} \"{}\"", name, value)
        }
    }
}

/// Detect the current shell environment.
pub fn detect_shell() -> ShellInfo {
    let executable = std::env::var("SHELL")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/bin/sh"));
    let shell_type = ShellType::from_executable(&executable.to_string_lossy());
    let home = dirs::home_dir().unwrap_or_default();

    ShellInfo {
        executable,
        name: shell_type,
        rc_file: rc_file_for(shell_type, &home),
    }
}

/// The rc file for a shell under `home`.
pub fn rc_file_for(shell_type: ShellType, home: &Path) -> Option<PathBuf> {
    match shell_type {
        ShellType::Bash => Some(home.join(".bashrc")),
        ShellType::Zsh => Some(home.join(".zshrc")),
        ShellType::Fish => Some(home.join(".config/fish/config.fish")),
        ShellType::Sh | ShellType::Unknown => Some(home.join(".profile")),
    }
}
