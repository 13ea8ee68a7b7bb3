//! Configuration management for tractstops.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::disparity::JoinPolicy;
use crate::error::{Error, Result};
use crate::pipeline::AnalysisOptions;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "tractstops";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "tractstops.db";

/// Environment variable prefix; nested keys are separated by `__`.
const ENV_PREFIX: &str = "TRACTSTOPS_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `TRACTSTOPS_`, e.g.
///    `TRACTSTOPS_DATA__COUNTY=King`)
/// 2. TOML config file at `~/.config/tractstops/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Input data configuration.
    pub data: DataConfig,
    /// Join configuration.
    pub join: JoinConfig,
    /// Regression configuration.
    pub fit: FitConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
}

/// Input data locations and scoping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Stop records CSV.
    pub stops_path: Option<PathBuf>,
    /// Census tracts CSV with WKT boundaries.
    pub tracts_path: Option<PathBuf>,
    /// Restrict the analysis to one county.
    pub county: Option<String>,
}

/// Join-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// Treatment of tracts without stops.
    pub policy: JoinPolicy,
    /// Boundary simplification tolerance in degrees; 0 disables it.
    pub simplify_tolerance: f64,
}

/// Regression-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Slopes within this band of zero are reported as weak trends.
    pub activity_tolerance: f64,
    /// Slopes within this distance of one are reported as proportional.
    pub proportionality_tolerance: f64,
}

/// Storage-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/tractstops/tractstops.db`
    pub database_path: Option<PathBuf>,
    /// Reuse computed tables keyed by an input digest.
    pub cache_enabled: bool,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            activity_tolerance: 0.005,
            proportionality_tolerance: 0.0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Will be resolved to default at runtime
            cache_enabled: true,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file).nested())
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let tolerance = self.join.simplify_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(Error::ConfigValidation {
                message: format!("simplify_tolerance must be non-negative, got {tolerance}"),
            });
        }

        for (name, value) in [
            ("activity_tolerance", self.fit.activity_tolerance),
            ("proportionality_tolerance", self.fit.proportionality_tolerance),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::ConfigValidation {
                    message: format!("{name} must be non-negative, got {value}"),
                });
            }
        }

        if let Some(county) = &self.data.county {
            if county.trim().is_empty() {
                return Err(Error::ConfigValidation {
                    message: "county cannot be empty".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Analysis options described by this configuration, with no hour filter.
    #[must_use]
    pub fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            county: self.data.county.clone(),
            hour: None,
            policy: self.join.policy,
            simplify_tolerance: self.join.simplify_tolerance,
        }
    }
}
