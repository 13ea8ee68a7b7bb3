//! `tractstops` - Tract-level traffic stop disparity analysis
//!
//! This library joins traffic stop records to the census tracts containing
//! them, aggregates stops per tract by subject race and stop activity, joins
//! those aggregates with tract demographics, and fits OLS trendlines whose
//! slope indicates over- or under-representation in stops.
//!
//! ```no_run
//! use tractstops::pipeline::{Analysis, AnalysisOptions, Inputs};
//! use tractstops::model::RaceCategory;
//!
//! # fn main() -> tractstops::Result<()> {
//! let inputs = Inputs::read("stops.csv", "tracts.csv")?;
//! let analysis = Analysis::run(&inputs, &AnalysisOptions::default())?;
//! let fit = analysis.table.race_fit(RaceCategory::Black, RaceCategory::Black)?;
//! println!("{fit}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod disparity;
pub mod error;
pub mod load;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod regression;
pub mod spatial;
pub mod stats;
pub mod storage;

pub use aggregate::StopAggregate;
pub use config::Config;
pub use disparity::{disparity_join, Column, DisparityTable, JoinPolicy};
pub use error::{Error, Result};
pub use load::{load_stops, load_tracts};
pub use logging::init_logging;
pub use pipeline::{Analysis, AnalysisOptions, InputDigest, Inputs};
pub use regression::{fit_ols, LinearFit};
pub use spatial::{spatial_join, Assignment, SpatialJoin};
pub use storage::{Storage, StorageStats};
