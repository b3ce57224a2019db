//! Command-line interface and configuration.
//!
//! This crate provides the `knobmix` binary: argument parsing, the
//! `config.toml` loader and the `run`, `ports`, `endpoints` and `config`
//! commands.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

pub use cli::Cli;
pub use config::KnobmixConfig;
pub use error::{CliError, CliResult};
