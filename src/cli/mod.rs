//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for HL7 Relay using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// HL7 Relay - HL7v2 to FHIR message processing engine
#[derive(Parser, Debug)]
#[command(name = "hl7relay")]
#[command(version, about, long_about = None)]
#[command(author = "HL7 Relay Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "hl7relay.toml", env = "HL7RELAY_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "HL7RELAY_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dispatch stored messages downstream until interrupted
    Run(commands::run::RunArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show per-channel backlog and lock holders
    Status(commands::status::StatusArgs),
}
