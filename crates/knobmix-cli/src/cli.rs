//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use knobmix_core::TracingOutputFormat;

/// knobmix - hardware knobs for your audio mixer
#[derive(Debug, Parser)]
#[command(name = "knobmix")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "KNOBMIX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log format: pretty, compact or json
    #[arg(long, env = "KNOBMIX_LOG_FORMAT")]
    pub log_format: Option<TracingOutputFormat>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Bridge the knob panel to the audio system (default)
    Run {
        /// Only try this serial port
        #[arg(long, short)]
        port: Option<String>,

        /// Use the in-memory audio backend; nothing reaches the system
        #[arg(long)]
        dry_run: bool,
    },

    /// List serial ports
    Ports {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List the audio sessions the backend reports
    Endpoints {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
