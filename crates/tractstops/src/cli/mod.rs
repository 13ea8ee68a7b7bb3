//! Command-line interface for tractstops.
//!
//! This module provides the CLI structure and text rendering for the
//! `tractstops` binary.

mod commands;
pub mod render;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    CacheCommand, ConfigCommand, DataArgs, DescribeCommand, FitCommand, HeadCommand,
    HoursCommand, ImportCommand, JoinCommand, OutputFormat, StatusCommand,
};

/// tractstops - Tract-level traffic stop disparity analysis
///
/// Joins traffic stops to the census tracts containing them, aggregates
/// stops by race and activity per tract, and fits trendlines against tract
/// demographics.
#[derive(Debug, Parser)]
#[command(name = "tractstops")]
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
    /// Build the tract aggregate table
    Join(JoinCommand),

    /// Fit OLS trendlines over the tract table
    #[command(subcommand)]
    Fit(FitCommand),

    /// Summary statistics of every numeric column
    Describe(DescribeCommand),

    /// Show the first rows of the tract table
    Head(HeadCommand),

    /// Stops by hour of day
    Hours(HoursCommand),

    /// Store stops, tracts and their assignment in the database
    Import(ImportCommand),

    /// Show database status
    Status(StatusCommand),

    /// Manage cached tables
    #[command(subcommand)]
    Cache(CacheCommand),

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
