//! rigup CLI entry point.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use rigup::cli::{Cli, CommandDispatcher};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the tracing subscriber for logging.
///
/// Log level is controlled by:
/// 1. `--debug` flag sets level to DEBUG
/// 2. `RUST_LOG` environment variable (if set)
/// 3. Default is INFO
///
/// Logs go to stderr; stdout carries the JSON report.
fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("rigup=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("rigup=info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    tracing::debug!("rigup starting with args: {:?}", cli);

    let dispatcher = CommandDispatcher::new(cli.catalog.clone());
    let mut stdout = io::stdout().lock();

    match dispatcher.dispatch(&cli, &mut stdout) {
        Ok(result) => ExitCode::from(result.exit_code as u8),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}
