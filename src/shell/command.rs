//! Subprocess execution with timeouts.
//!
//! Every invocation carries a timeout in seconds; a timeout is the only
//! cancellation mechanism and surfaces as a failed [`CommandResult`] with
//! `timed_out` set.

use crate::error::{RigupError, Result};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

/// Default timeout for a single subprocess, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Result of executing a command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code (None if killed by signal or timed out).
    pub exit_code: Option<i32>,

    /// Standard output.
    pub stdout: String,

    /// Standard error.
    pub stderr: String,

    /// Execution duration.
    pub duration: Duration,

    /// Whether command succeeded (exit code 0).
    pub success: bool,

    /// Whether the command was killed after exceeding its timeout.
    pub timed_out: bool,
}

impl CommandResult {
    /// Create a success result.
    pub fn success(stdout: String, stderr: String, duration: Duration) -> Self {
        Self {
            exit_code: Some(0),
            stdout,
            stderr,
            duration,
            success: true,
            timed_out: false,
        }
    }

    /// Create a failure result.
    pub fn failure(
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        duration: Duration,
    ) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            duration,
            success: false,
            timed_out: false,
        }
    }

    /// Short human-readable failure description.
    pub fn error_message(&self) -> String {
        if self.timed_out {
            format!("Timed out after {}s", self.duration.as_secs())
        } else {
            let tail = last_lines(&self.stderr, 5);
            match (self.exit_code, tail.is_empty()) {
                (Some(code), true) => format!("Exited with code {}", code),
                (Some(code), false) => format!("Exited with code {}: {}", code, tail),
                (None, _) => "Terminated by signal".to_string(),
            }
        }
    }
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim_end().lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

/// Options for command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Working directory.
    pub cwd: Option<PathBuf>,

    /// Environment variables (merged with system env).
    pub env: HashMap<String, String>,

    /// Capture stdout (if false, inherits from parent).
    pub capture_stdout: bool,

    /// Capture stderr (if false, inherits from parent).
    pub capture_stderr: bool,

    /// Timeout in seconds (None = [`DEFAULT_TIMEOUT_SECS`]).
    pub timeout: Option<u64>,

    /// Data written to the child's stdin (e.g. a sudo password).
    pub stdin: Option<String>,
}

impl CommandOptions {
    /// Capture both streams with the given timeout.
    pub fn captured(timeout: u64) -> Self {
        Self {
            capture_stdout: true,
            capture_stderr: true,
            timeout: Some(timeout),
            ..Default::default()
        }
    }
}

/// Execute a shell command line through `sh -c`.
pub fn execute(command: &str, options: &CommandOptions) -> Result<CommandResult> {
    let argv = vec!["sh".to_string(), "-c".to_string(), command.to_string()];
    execute_argv(&argv, options)
}

/// Execute an argv directly, without a shell.
pub fn execute_argv(argv: &[String], options: &CommandOptions) -> Result<CommandResult> {
    let Some((program, args)) = argv.split_first() else {
        return Err(RigupError::CommandFailed {
            command: String::new(),
            code: None,
        });
    };
    let shown = argv.join(" ");
    debug!("Running: {}", redact(&shown));

    let start = Instant::now();
    let mut cmd = Command::new(program);
    cmd.args(args);

    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in &options.env {
        cmd.env(key, value);
    }

    cmd.stdin(if options.stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    cmd.stdout(if options.capture_stdout {
        Stdio::piped()
    } else {
        Stdio::inherit()
    });
    cmd.stderr(if options.capture_stderr {
        Stdio::piped()
    } else {
        Stdio::inherit()
    });

    let mut child = cmd.spawn().map_err(|_| RigupError::CommandFailed {
        command: shown.clone(),
        code: None,
    })?;

    if let (Some(input), Some(mut stdin)) = (&options.stdin, child.stdin.take()) {
        // Broken pipe just means the child did not read its input.
        let _ = stdin.write_all(input.as_bytes());
    }

    let stdout_handle = child.stdout.take().map(|mut out| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = out.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).to_string()
        })
    });
    let stderr_handle = child.stderr.take().map(|mut err| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = err.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).to_string()
        })
    });

    let timeout = Duration::from_secs(options.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS));
    let status = child.wait_timeout(timeout)?;
    let timed_out = status.is_none();
    if timed_out {
        warn!("Command timed out after {}s: {}", timeout.as_secs(), redact(&shown));
        let _ = child.kill();
        let _ = child.wait();
    }

    let stdout = stdout_handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    let stderr = stderr_handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default();
    let duration = start.elapsed();

    match status {
        Some(status) if status.success() => Ok(CommandResult::success(stdout, stderr, duration)),
        Some(status) => Ok(CommandResult::failure(status.code(), stdout, stderr, duration)),
        None => {
            let mut result = CommandResult::failure(None, stdout, stderr, duration);
            result.timed_out = true;
            Ok(result)
        }
    }
}

/// Wrap an argv with sudo.
///
/// With a password, sudo reads it from stdin (`-S`) and the caller must
/// pass the returned stdin payload; without one, sudo runs non-interactively
/// (`-n`) and fails fast instead of hanging on a prompt.
pub fn sudo_wrap(argv: &[String], password: Option<&str>) -> (Vec<String>, Option<String>) {
    let mut wrapped = vec!["sudo".to_string()];
    let stdin = match password {
        Some(pw) => {
            wrapped.extend(["-S", "-k", "-p", ""].map(String::from));
            Some(format!("{}\n", pw))
        }
        None => {
            wrapped.push("-n".to_string());
            None
        }
    };
    wrapped.extend(argv.iter().cloned());
    (wrapped, stdin)
}

/// Quote a value for safe inclusion in an `sh -c` command line.
pub fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@%+,".contains(c))
    {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', "'\\''"))
    }
}

/// Join an argv into a shell command line.
pub fn join_argv(argv: &[String]) -> String {
    argv.iter()
        .map(|a| shell_quote(a))
        .collect::<Vec<_>>()
        .join(" ")
}

fn redact(command: &str) -> String {
    if command.contains("Authorization") {
        "<command with credentials>".to_string()
    } else {
        command.to_string()
    }
}
