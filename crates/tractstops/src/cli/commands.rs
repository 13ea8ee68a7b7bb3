//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::config::Config;
use crate::disparity::{Column, JoinPolicy};
use crate::error::{Error, Result};
use crate::model::{Activity, RaceCategory};
use crate::pipeline::AnalysisOptions;

/// Input files and analysis options shared by every table command.
///
/// Flags override the matching configuration values.
#[derive(Debug, Clone, Default, Args)]
pub struct DataArgs {
    /// Stop records CSV (overrides `data.stops_path`)
    #[arg(long, value_name = "FILE")]
    pub stops: Option<PathBuf>,

    /// Census tracts CSV with WKT boundaries (overrides `data.tracts_path`)
    #[arg(long, value_name = "FILE")]
    pub tracts: Option<PathBuf>,

    /// Only analyze tracts in this county
    #[arg(long)]
    pub county: Option<String>,

    /// Only count stops made during this hour of day (0-23)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..24))]
    pub hour: Option<u32>,

    /// Keep tracts without stops (left) or drop them (inner)
    #[arg(long, value_enum)]
    pub policy: Option<JoinPolicy>,

    /// Simplify tract boundaries with this tolerance in degrees
    #[arg(long, value_name = "DEGREES")]
    pub simplify: Option<f64>,

    /// Recompute even if a cached table exists
    #[arg(long)]
    pub no_cache: bool,
}

impl DataArgs {
    /// Resolve both input paths and the analysis options against `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingInput`] when neither the flag nor the
    /// configuration names an input file, or a validation error for bad options.
    pub fn resolve(&self, config: &Config) -> Result<(PathBuf, PathBuf, AnalysisOptions)> {
        let stops = self
            .stops
            .clone()
            .or_else(|| config.data.stops_path.clone())
            .ok_or(Error::MissingInput { dataset: "stops" })?;
        let tracts = self
            .tracts
            .clone()
            .or_else(|| config.data.tracts_path.clone())
            .ok_or(Error::MissingInput { dataset: "tracts" })?;

        let mut options = config.analysis_options();
        if let Some(county) = &self.county {
            options.county = Some(county.clone());
        }
        options.hour = self.hour;
        if let Some(policy) = self.policy {
            options.policy = policy;
        }
        if let Some(tolerance) = self.simplify {
            options.simplify_tolerance = tolerance;
        }
        options.validate()?;

        Ok((stops, tracts, options))
    }
}

/// Join command arguments.
#[derive(Debug, Args)]
pub struct JoinCommand {
    #[command(flatten)]
    pub data: DataArgs,

    /// Write the table to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "csv")]
    pub format: OutputFormat,
}

/// Trendline commands.
#[derive(Debug, Subcommand)]
pub enum FitCommand {
    /// Fit StopsPct<race> against TractPct<race> (the disparity slope)
    Race {
        #[command(flatten)]
        data: DataArgs,

        /// Race category (every category when omitted)
        #[arg(short, long, value_parser = parse_race)]
        race: Option<RaceCategory>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Fit StopsPct<activity> against TractPct<race>
    Activity {
        #[command(flatten)]
        data: DataArgs,

        /// Race category on the x axis
        #[arg(short, long, value_parser = parse_race, default_value = "BIPOC")]
        race: RaceCategory,

        /// Activity on the y axis (every activity when omitted)
        #[arg(short, long, value_parser = parse_activity)]
        activity: Option<Activity>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Fit any two numeric columns
    Columns {
        #[command(flatten)]
        data: DataArgs,

        /// Column on the x axis (e.g. TractPctBlack)
        #[arg(value_parser = parse_column)]
        x: Column,

        /// Column on the y axis (e.g. StopsPctBlack)
        #[arg(value_parser = parse_column)]
        y: Column,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Slopes of every race and activity trendline
    Summary {
        #[command(flatten)]
        data: DataArgs,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
}

/// Describe command arguments.
#[derive(Debug, Args)]
pub struct DescribeCommand {
    #[command(flatten)]
    pub data: DataArgs,

    /// Only describe columns whose name matches this regex
    #[arg(short = 'm', long = "match", value_name = "REGEX")]
    pub pattern: Option<String>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Head command arguments.
#[derive(Debug, Args)]
pub struct HeadCommand {
    #[command(flatten)]
    pub data: DataArgs,

    /// Number of rows to show
    #[arg(short = 'n', long, default_value = "5")]
    pub rows: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Hours command arguments.
#[derive(Debug, Args)]
pub struct HoursCommand {
    /// Stop records CSV (overrides `data.stops_path`)
    #[arg(long, value_name = "FILE")]
    pub stops: Option<PathBuf>,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Import command arguments.
#[derive(Debug, Args)]
pub struct ImportCommand {
    #[command(flatten)]
    pub data: DataArgs,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Table cache commands.
#[derive(Debug, Subcommand)]
pub enum CacheCommand {
    /// Remove every cached table
    Clear,
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

/// Output format for table commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Comma-separated values
    #[default]
    Csv,
    /// JSON array of row objects
    Json,
    /// Aligned text
    Table,
}

fn parse_race(s: &str) -> std::result::Result<RaceCategory, String> {
    s.parse().map_err(|e: Error| e.to_string())
}

fn parse_activity(s: &str) -> std::result::Result<Activity, String> {
    s.parse().map_err(|e: Error| e.to_string())
}

fn parse_column(s: &str) -> std::result::Result<Column, String> {
    s.parse().map_err(|e: Error| e.to_string())
}
