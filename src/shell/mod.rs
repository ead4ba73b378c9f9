//! Shell command execution and shell detection.

pub mod command;
pub mod platform;

pub use command::{
    execute, execute_argv, join_argv, shell_quote, sudo_wrap, CommandOptions,
    CommandResult, DEFAULT_TIMEOUT_SECS,
};
pub use platform::{detect_shell, rc_file_for, ShellInfo, ShellType};
