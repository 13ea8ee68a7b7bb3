//! End-to-end analysis: load, scope, join, aggregate, and build the table.
//!
//! A run is a pure function of the two input files and [`AnalysisOptions`],
//! so its result can be memoized under an [`InputDigest`] of those inputs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::aggregate::StopAggregate;
use crate::disparity::{disparity_join, DisparityReport, DisparityTable, JoinPolicy};
use crate::error::{Error, Result};
use crate::load::{read_stops, read_tracts, StopLoadReport, StopTable, TractLoadReport, TractTable};
use crate::spatial::{JoinReport, SpatialJoin, TractIndex};
use crate::storage::Storage;

/// Bumped whenever the cached payload or the computation changes shape.
const DIGEST_FORMAT: &[u8] = b"tractstops-table-v1";

/// Options that change the computed table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    /// Keep only tracts in this county (case-insensitive).
    pub county: Option<String>,
    /// Keep only stops made during this hour of day (0-23).
    pub hour: Option<u32>,
    /// Treatment of tracts without stops.
    pub policy: JoinPolicy,
    /// Boundary simplification tolerance in degrees; 0 disables it.
    pub simplify_tolerance: f64,
}

impl AnalysisOptions {
    /// Check option ranges.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an hour above 23 or a negative or
    /// non-finite tolerance.
    pub fn validate(&self) -> Result<()> {
        if let Some(hour) = self.hour {
            if hour > 23 {
                return Err(Error::config(format!("hour must be 0-23, got {hour}")));
            }
        }
        if !self.simplify_tolerance.is_finite() || self.simplify_tolerance < 0.0 {
            return Err(Error::config(format!(
                "simplify_tolerance must be a non-negative number, got {}",
                self.simplify_tolerance
            )));
        }
        Ok(())
    }
}

/// BLAKE3 digest identifying a run's inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InputDigest(String);

impl InputDigest {
    /// Digest both files' bytes and every option that affects the result.
    #[must_use]
    pub fn compute(stops: &[u8], tracts: &[u8], options: &AnalysisOptions) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DIGEST_FORMAT);
        for bytes in [stops, tracts] {
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        match &options.county {
            Some(county) => {
                hasher.update(b"county:");
                hasher.update(county.trim().to_lowercase().as_bytes());
            }
            None => {
                hasher.update(b"county:*");
            }
        }
        let hour = options.hour.map_or(-1, i64::from);
        hasher.update(&hour.to_le_bytes());
        hasher.update(options.policy.to_string().as_bytes());
        hasher.update(&options.simplify_tolerance.to_bits().to_le_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Full hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for display.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl std::fmt::Display for InputDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw bytes of the two input files.
#[derive(Debug, Clone)]
pub struct Inputs {
    stops_path: PathBuf,
    stops: Vec<u8>,
    tracts_path: PathBuf,
    tracts: Vec<u8>,
}

impl Inputs {
    /// Read both input files.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be read.
    pub fn read(stops_path: impl AsRef<Path>, tracts_path: impl AsRef<Path>) -> Result<Self> {
        let stops_path = stops_path.as_ref().to_path_buf();
        let tracts_path = tracts_path.as_ref().to_path_buf();
        let read = |path: &Path| {
            fs::read(path).map_err(|e| Error::CsvRead {
                path: path.to_path_buf(),
                source: csv::Error::from(e),
            })
        };
        let contents = Self::from_bytes(read(&stops_path)?, read(&tracts_path)?);
        Ok(Self {
            stops_path,
            tracts_path,
            ..contents
        })
    }

    /// Wrap in-memory CSV contents.
    #[must_use]
    pub fn from_bytes(stops: impl Into<Vec<u8>>, tracts: impl Into<Vec<u8>>) -> Self {
        Self {
            stops_path: PathBuf::from("<stops>"),
            stops: stops.into(),
            tracts_path: PathBuf::from("<tracts>"),
            tracts: tracts.into(),
        }
    }

    /// Digest of these inputs under `options`.
    #[must_use]
    pub fn digest(&self, options: &AnalysisOptions) -> InputDigest {
        InputDigest::compute(&self.stops, &self.tracts, options)
    }
}

/// Stops and tracts after loading, scoping, simplification and hour filtering.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Stops that survive the hour filter.
    pub stops: StopTable,
    /// Tracts that survive county scoping.
    pub tracts: TractTable,
}

impl Dataset {
    /// Parse `inputs` and apply `options`.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid options or unreadable input files.
    pub fn load(inputs: &Inputs, options: &AnalysisOptions) -> Result<Self> {
        options.validate()?;

        let mut stops = read_stops(inputs.stops.as_slice(), &inputs.stops_path)?;
        let mut tracts = read_tracts(inputs.tracts.as_slice(), &inputs.tracts_path)?;

        if let Some(county) = &options.county {
            tracts.scope_to_county(county);
            if tracts.tracts.is_empty() {
                warn!(county = %county, "No tracts in county");
            }
        }
        tracts.simplify(options.simplify_tolerance);
        if let Some(hour) = options.hour {
            stops.retain_hour(hour);
        }

        Ok(Self { stops, tracts })
    }

    /// Assign every stop to a tract.
    #[must_use]
    pub fn spatial_join(&self) -> SpatialJoin {
        TractIndex::new(&self.tracts.tracts).join(&self.stops.records)
    }

    /// Aggregate a join of this dataset and build the tract aggregate table.
    #[must_use]
    pub fn table(&self, join: &SpatialJoin, policy: JoinPolicy) -> DisparityTable {
        let aggregate = StopAggregate::from_join(&self.stops.records, join);
        disparity_join(&aggregate, &self.tracts.tracts, policy)
    }
}

/// Every count produced along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Stop loading.
    pub stops: StopLoadReport,
    /// Tract loading and scoping.
    pub tracts: TractLoadReport,
    /// Spatial join.
    pub join: JoinReport,
    /// Disparity join.
    pub disparity: DisparityReport,
}

/// A completed analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Digest of the inputs and options.
    pub digest: InputDigest,
    /// Options the run used.
    pub options: AnalysisOptions,
    /// The tract aggregate table.
    pub table: DisparityTable,
    /// Counts from every stage.
    pub report: PipelineReport,
    /// Whether the result came from the cache.
    #[serde(skip)]
    pub from_cache: bool,
}

impl Analysis {
    /// Run the pipeline on a prepared dataset.
    #[must_use]
    pub fn from_dataset(dataset: &Dataset, options: &AnalysisOptions, digest: InputDigest) -> Self {
        let join = dataset.spatial_join();
        let table = dataset.table(&join, options.policy);
        let report = PipelineReport {
            stops: dataset.stops.report.clone(),
            tracts: dataset.tracts.report.clone(),
            join: join.report,
            disparity: table.report().clone(),
        };
        info!(digest = digest.short(), rows = table.len(), "Analysis complete");
        Self {
            digest,
            options: options.clone(),
            table,
            report,
            from_cache: false,
        }
    }

    /// Run the pipeline from raw inputs.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid options or unreadable input files.
    pub fn run(inputs: &Inputs, options: &AnalysisOptions) -> Result<Self> {
        let digest = inputs.digest(options);
        let dataset = Dataset::load(inputs, options)?;
        Ok(Self::from_dataset(&dataset, options, digest))
    }

    /// Like [`Analysis::run`], reusing a cached result from `storage` when
    /// the digest matches and caching a fresh one otherwise.
    ///
    /// Cache failures are logged and never fail the run.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid options or unreadable input files.
    pub fn run_cached(
        inputs: &Inputs,
        options: &AnalysisOptions,
        storage: Option<&Storage>,
    ) -> Result<Self> {
        let Some(storage) = storage else {
            return Self::run(inputs, options);
        };

        let digest = inputs.digest(options);
        match storage.cache_get::<Self>(digest.as_str()) {
            Ok(Some(mut cached)) => {
                info!(digest = digest.short(), "Using cached table");
                cached.from_cache = true;
                return Ok(cached);
            }
            Ok(None) => debug!(digest = digest.short(), "Cache miss"),
            Err(e) => warn!(error = %e, "Cache lookup failed"),
        }

        let analysis = Self::run(inputs, options)?;
        if let Err(e) = storage.cache_put(digest.as_str(), &analysis) {
            warn!(error = %e, "Failed to cache table");
        }
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RaceCategory, TractId};

    const TRACTS: &str = "TractID,County,PctBlack,PctWhite,geometry\n\
        1,King,10,80,\"POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))\"\n\
        2,King,30,60,\"POLYGON ((1 0, 2 0, 2 1, 1 1, 1 0))\"\n\
        3,Pierce,50,40,\"POLYGON ((2 0, 3 0, 3 1, 2 1, 2 0))\"\n";

    const STOPS: &str = "date_time,geometry,subject_race,search_conducted\n\
        2018-01-01 08:00:00,POINT (0.5 0.5),black,TRUE\n\
        2018-01-01 09:00:00,POINT (0.5 0.5),white,FALSE\n\
        2018-01-01 08:30:00,POINT (1.5 0.5),black,FALSE\n\
        2018-01-01 08:30:00,POINT (9 9),white,FALSE\n\
        2018-01-01 08:30:00,,white,FALSE\n";

    fn inputs() -> Inputs {
        Inputs::from_bytes(STOPS, TRACTS)
    }

    #[test]
    fn test_run_end_to_end() {
        let analysis = Analysis::run(&inputs(), &AnalysisOptions::default()).unwrap();
        let table = &analysis.table;
        assert_eq!(table.len(), 3);

        let row = table.get(&TractId::from("1")).unwrap();
        assert_eq!(row.stops, 2);
        assert_eq!(row.stops_pct_race[RaceCategory::Black.index()], Some(50.0));

        let empty = table.get(&TractId::from("3")).unwrap();
        assert_eq!(empty.stops, 0);

        let report = &analysis.report;
        assert_eq!(report.stops.rows_read, 5);
        assert_eq!(report.join.assigned, 3);
        assert_eq!(report.join.unassigned, 1);
        assert_eq!(report.join.invalid_coordinates, 1);
        assert_eq!(report.disparity.tracts_without_stops, 1);
        assert!(!analysis.from_cache);
    }

    #[test]
    fn test_county_scope_and_inner_join() {
        let options = AnalysisOptions {
            county: Some("king".to_string()),
            policy: JoinPolicy::Inner,
            ..AnalysisOptions::default()
        };
        let analysis = Analysis::run(&inputs(), &options).unwrap();
        assert_eq!(analysis.table.len(), 2);
        assert_eq!(analysis.report.tracts.out_of_scope, 1);
    }

    #[test]
    fn test_hour_filter() {
        let options = AnalysisOptions {
            hour: Some(8),
            ..AnalysisOptions::default()
        };
        let analysis = Analysis::run(&inputs(), &options).unwrap();
        assert_eq!(analysis.report.stops.outside_hour, 1);
        let row = analysis.table.get(&TractId::from("1")).unwrap();
        assert_eq!(row.stops, 1);
    }

    #[test]
    fn test_invalid_hour_rejected() {
        let options = AnalysisOptions {
            hour: Some(24),
            ..AnalysisOptions::default()
        };
        assert!(Analysis::run(&inputs(), &options).is_err());
    }

    #[test]
    fn test_digest_tracks_inputs_and_options() {
        let base = AnalysisOptions::default();
        let d1 = inputs().digest(&base);
        assert_eq!(d1, inputs().digest(&base));
        assert_eq!(d1.as_str().len(), 64);
        assert_eq!(d1.short().len(), 12);

        let inner = AnalysisOptions {
            policy: JoinPolicy::Inner,
            ..AnalysisOptions::default()
        };
        assert_ne!(d1, inputs().digest(&inner));

        let other = Inputs::from_bytes(STOPS.replace("black", "hispanic"), TRACTS);
        assert_ne!(d1, other.digest(&base));

        // County matching is case-insensitive, so is the digest.
        let upper = AnalysisOptions {
            county: Some("KING".to_string()),
            ..AnalysisOptions::default()
        };
        let lower = AnalysisOptions {
            county: Some("king".to_string()),
            ..AnalysisOptions::default()
        };
        assert_eq!(inputs().digest(&upper), inputs().digest(&lower));
    }

    /// Stops whose per-tract shares are repeating decimals (1/7, 1/3, 2/9).
    fn repeating_share_inputs() -> Inputs {
        let mut stops = String::from("geometry,subject_race,search_conducted,citation_issued\n");
        for (x, black, total) in [(0.5, 1, 7), (1.5, 1, 3), (2.5, 2, 9)] {
            for i in 0..total {
                let race = if i < black { "black" } else { "white" };
                let searched = i % 3 == 0;
                stops.push_str(&format!("POINT ({x} 0.5),{race},{searched},{}\n", i % 2 == 0));
            }
        }
        Inputs::from_bytes(stops, TRACTS)
    }

    #[test]
    fn test_run_cached_hits_second_time() {
        let storage = Storage::open_in_memory().unwrap();
        let options = AnalysisOptions::default();
        let inputs = repeating_share_inputs();

        let first = Analysis::run_cached(&inputs, &options, Some(&storage)).unwrap();
        assert!(!first.from_cache);

        let second = Analysis::run_cached(&inputs, &options, Some(&storage)).unwrap();
        assert!(second.from_cache);
        assert_eq!(second.table, first.table);
        assert_eq!(second.report, first.report);

        let fresh = first
            .table
            .race_fit(RaceCategory::Black, RaceCategory::Black)
            .unwrap();
        let cached = second
            .table
            .race_fit(RaceCategory::Black, RaceCategory::Black)
            .unwrap();
        assert_eq!(cached.slope.to_bits(), fresh.slope.to_bits());
        assert_eq!(cached.intercept.to_bits(), fresh.intercept.to_bits());
    }

    #[test]
    fn test_run_cached_without_storage() {
        let analysis = Analysis::run_cached(&inputs(), &AnalysisOptions::default(), None).unwrap();
        assert!(!analysis.from_cache);
    }

    #[test]
    fn test_inputs_read_keeps_paths_and_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let stops = dir.path().join("stops.csv");
        let tracts = dir.path().join("tracts.csv");
        fs::write(&stops, STOPS).unwrap();
        fs::write(&tracts, TRACTS).unwrap();

        let from_disk = Inputs::read(&stops, &tracts).unwrap();
        assert_eq!(from_disk.stops_path, stops);
        assert_eq!(from_disk.tracts_path, tracts);
        let options = AnalysisOptions::default();
        assert_eq!(from_disk.digest(&options), inputs().digest(&options));
    }

    #[test]
    fn test_inputs_read_missing_file() {
        let err = Inputs::read("/nonexistent/stops.csv", "/nonexistent/tracts.csv").unwrap_err();
        assert!(matches!(err, Error::CsvRead { .. }));
    }
}
