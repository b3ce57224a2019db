//! Subcommand implementations.

pub mod config;
pub mod endpoints;
pub mod ports;
pub mod run;
