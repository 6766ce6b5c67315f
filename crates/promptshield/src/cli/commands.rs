//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::dom::Decision;

/// Scan command arguments.
#[derive(Debug, Args)]
pub struct ScanCommand {
    /// Text to scan (reads standard input when omitted)
    #[arg(conflicts_with = "file")]
    pub text: Option<String>,

    /// Read the text from a file
    #[arg(short, long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,

    /// Neither read nor update the result cache
    #[arg(long)]
    pub no_cache: bool,
}

/// Redact command arguments.
#[derive(Debug, Args)]
pub struct RedactCommand {
    /// Text to redact (reads standard input when omitted)
    #[arg(conflicts_with = "file")]
    pub text: Option<String>,

    /// Read the text from a file
    #[arg(short, long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Replacement for each match (defaults to the configured token)
    #[arg(short, long)]
    pub token: Option<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Result cache commands.
#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Show cache and store statistics
    Stats {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Remove every cached result
    Clear,
}

/// Platforms command arguments.
#[derive(Debug, Args)]
pub struct PlatformsCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Simulate command arguments.
#[derive(Debug, Args)]
pub struct SimulateCommand {
    /// Message to submit
    pub text: String,

    /// Hostname of the simulated page
    #[arg(short, long, default_value = "chatgpt.com")]
    pub site: String,

    /// Answer to give if the prompt appears
    #[arg(short, long, value_enum, default_value = "keep")]
    pub decision: DecisionArg,
}

/// Answer given to the sensitive-data prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DecisionArg {
    /// Send the message unchanged
    Keep,
    /// Redact the matches
    Remove,
    /// Close the prompt without choosing
    Dismiss,
}

impl From<DecisionArg> for Decision {
    fn from(arg: DecisionArg) -> Self {
        match arg {
            DecisionArg::Keep => Self::Proceed,
            DecisionArg::Remove => Self::Redact,
            DecisionArg::Dismiss => Self::Dismissed,
        }
    }
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
