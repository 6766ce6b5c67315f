//! Command-line interface for promptshield.
//!
//! This module provides the CLI structure for the `pshield` binary, a
//! developer harness over the detection engine and the interception flow.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    CacheCommand, ConfigCommand, DecisionArg, PlatformsCommand, RedactCommand, ScanCommand,
    SimulateCommand,
};

/// pshield - Catch sensitive data before it reaches an AI chat
///
/// Scans text for social security numbers, card numbers, email addresses
/// and phone numbers, redacts them, and replays the submit interception
/// flow against an in-memory chat page.
#[derive(Debug, Parser)]
#[command(name = "pshield")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Detect sensitive data in text
    Scan(ScanCommand),

    /// Replace sensitive data in text
    Redact(RedactCommand),

    /// Inspect or clear the result cache
    #[command(subcommand)]
    Cache(CacheCommand),

    /// List supported chat platforms
    Platforms(PlatformsCommand),

    /// Run a submit through the interception flow on a simulated page
    Simulate(SimulateCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
