//! Moodshift CLI - Audio Effect Chain Processor
//!
//! Command-line interface for the Moodshift effects processor.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use moodshift::cli::commands;
use moodshift::cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    debug!("Moodshift v{}", env!("CARGO_PKG_VERSION"));

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = commands::load_config(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Commands::Process {
            input,
            format,
            chain,
            out_dir,
            timeout_secs,
        } => {
            let status = commands::process(
                config,
                &input,
                &format,
                &chain,
                out_dir.as_deref(),
                Duration::from_secs(timeout_secs),
            )
            .with_context(|| format!("processing {} failed", input.display()))?;
            Ok(commands::succeeded(&status))
        }
        Commands::Sweep { max_age_days } => {
            commands::sweep(config, max_age_days).context("retention sweep failed")?;
            Ok(true)
        }
        Commands::Effects => {
            commands::list_effects()?;
            Ok(true)
        }
    }
}
