//! knobmix CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

use knobmix_cli::cli::{Cli, Command, ConfigAction};
use knobmix_cli::commands;
use knobmix_cli::config::KnobmixConfig;
use knobmix_cli::error::CliResult;
use knobmix_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(tracing_config(&cli)) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// The bridge logs progress at info; one-shot commands only warn.
fn tracing_config(cli: &Cli) -> TracingConfig {
    let runs_bridge = matches!(cli.command, None | Some(Command::Run { .. }));
    let config = if cli.debug {
        TracingConfig::cli_debug()
    } else if runs_bridge {
        TracingConfig::daemon()
    } else {
        TracingConfig::daemon().with_level(Level::WARN)
    };

    match cli.log_format {
        Some(format) => config.with_format(format),
        None => config,
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    let path = cli.config.as_deref();

    match cli.command {
        Some(Command::Config { action }) => match action {
            ConfigAction::Dump => commands::config::dump(&KnobmixConfig::load(path), path),
            ConfigAction::Validate => commands::config::validate(path),
            ConfigAction::Path => commands::config::path(path),
        },
        Some(Command::Ports { json }) => commands::ports::ports(json),
        Some(Command::Endpoints { json }) => {
            commands::endpoints::endpoints(&KnobmixConfig::load(path), json)
        }
        Some(Command::Run { port, dry_run }) => {
            commands::run::run(&KnobmixConfig::load(path), port, dry_run).await
        }
        None => commands::run::run(&KnobmixConfig::load(path), None, false).await,
    }
}
