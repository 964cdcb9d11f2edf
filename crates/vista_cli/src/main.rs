//! vista CLI - Main entry point.
//!
//! Exit codes:
//! - 0: Success
//! - 1: General error
//! - 2: Invalid arguments
//! - 3: View not found
//! - 4: Template compile error

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vista_core::ViewError;

mod commands;

use commands::{Cli, Commands};

/// CI-friendly exit codes
pub struct ExitCodes;

impl ExitCodes {
    pub const SUCCESS: u8 = 0;
    pub const GENERAL_ERROR: u8 = 1;
    pub const INVALID_ARGS: u8 = 2;
    pub const NOT_FOUND: u8 = 3;
    pub const COMPILE_ERROR: u8 = 4;
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "vista=debug"
    } else if cli.quiet {
        "vista=warn"
    } else {
        "vista=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logs go to stderr so rendered output stays clean on stdout.
    let log_result = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();

    if log_result.is_err() {
        // Logging already initialized, continue
    }

    let result = match &cli.command {
        Commands::Render(args) => commands::render::execute(&cli, args),
        Commands::Compile(args) => commands::compile::execute(&cli, args),
        Commands::Clear(args) => commands::clear::execute(&cli, args),
    };

    match result {
        Ok(()) => ExitCode::from(ExitCodes::SUCCESS),
        Err(e) => {
            let exit_code = categorize_error(&e);
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_code)
        }
    }
}

/// Categorize error to determine exit code
fn categorize_error(e: &anyhow::Error) -> u8 {
    match e.downcast_ref::<ViewError>() {
        Some(ViewError::NotFound(_)) => ExitCodes::NOT_FOUND,
        Some(ViewError::Compile { .. }) => ExitCodes::COMPILE_ERROR,
        Some(ViewError::InvalidName(_)) | Some(ViewError::InvalidData(_)) => ExitCodes::INVALID_ARGS,
        Some(_) => ExitCodes::GENERAL_ERROR,
        None if e.is::<serde_json::Error>() => ExitCodes::INVALID_ARGS,
        None => ExitCodes::GENERAL_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_exit_codes_follow_view_errors() {
        let not_found = anyhow::Error::new(ViewError::NotFound("x".into()));
        assert_eq!(categorize_error(&not_found), ExitCodes::NOT_FOUND);

        let compile: anyhow::Result<()> = Err(ViewError::Compile {
            path: "a".into(),
            line: 1,
            message: "bad".into(),
        })
        .context("rendering a");
        assert_eq!(categorize_error(&compile.unwrap_err()), ExitCodes::COMPILE_ERROR);

        let other = anyhow::anyhow!("boom");
        assert_eq!(categorize_error(&other), ExitCodes::GENERAL_ERROR);
    }
}
