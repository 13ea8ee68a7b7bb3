//! Storage layer for tractstops.
//!
//! This module provides `SQLite`-based persistence for an imported dataset
//! (stops, tracts and the stop-to-tract relation) and a cache of computed
//! aggregate tables keyed by input digest.

pub mod migrations;
pub mod schema;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};
use wkt::ToWkt;

use crate::error::{Error, Result};
use crate::load::parse_boundary;
use crate::model::{CensusTract, Demographics, RaceCategory, StopRecord, TractId};
use crate::spatial::SpatialJoin;

const IMPORTED_AT_KEY: &str = "imported_at";
const IMPORT_DIGEST_KEY: &str = "import_digest";

/// Storage engine for imported datasets and cached tables.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

/// Rows written by [`Storage::import`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Stop rows written.
    pub stops: usize,
    /// Tract rows written.
    pub tracts: usize,
    /// `happen_in` rows written.
    pub assignments: usize,
}

impl Storage {
    /// Open or create a storage database at the given path.
    ///
    /// Creates the parent directories and database file if they don't exist.
    /// Initializes the schema if this is a new database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or schema initialization fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| Error::DirectoryCreate {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        migrations::initialize_schema(&conn)?;

        info!("Database opened successfully at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Create an in-memory storage instance for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the stored dataset with `stops`, `tracts` and the assignments
    /// of `join`, in a single transaction.
    ///
    /// `join.assignments[i]` must describe `stops[i]`.
    ///
    /// # Errors
    ///
    /// Returns an error if the assignments do not line up with the stops or a
    /// database operation fails; nothing is written in that case.
    pub fn import(
        &mut self,
        stops: &[StopRecord],
        tracts: &[CensusTract],
        join: &SpatialJoin,
        digest: &str,
    ) -> Result<ImportSummary> {
        if join.assignments.len() != stops.len() {
            return Err(Error::internal(format!(
                "{} assignments for {} stops",
                join.assignments.len(),
                stops.len()
            )));
        }

        let tx = self.conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM happen_in; DELETE FROM traffic_stops; DELETE FROM census_tracts;",
        )?;

        let mut summary = ImportSummary::default();
        {
            let mut insert_tract = tx.prepare(
                r"
                INSERT INTO census_tracts (
                    tract_id, county, population,
                    pct_white, pct_black, pct_hispanic, pct_aapi, pct_other, pct_bipoc,
                    median_age, median_income, pct_male, pct_college_educated,
                    pct_below_poverty, boundary_wkt
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                ",
            )?;
            for tract in tracts {
                let demo = &tract.demographics;
                let pct = |c: RaceCategory| demo.pct(c);
                insert_tract.execute(params![
                    tract.id.as_str(),
                    tract.county,
                    demo.population,
                    pct(RaceCategory::White),
                    pct(RaceCategory::Black),
                    pct(RaceCategory::Hispanic),
                    pct(RaceCategory::Aapi),
                    pct(RaceCategory::Other),
                    pct(RaceCategory::Bipoc),
                    demo.median_age,
                    demo.median_income,
                    demo.pct_male,
                    demo.pct_college_educated,
                    demo.pct_below_poverty,
                    tract.boundary.wkt_string(),
                ])?;
                summary.tracts += 1;
            }

            let mut insert_stop = tx.prepare(
                r"
                INSERT INTO traffic_stops (
                    row_id, stop_id, date_time, lon, lat, subject_age, subject_race,
                    subject_sex, search_conducted, frisk_performed, contraband_found,
                    citation_issued, warning_issued, outcome
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                ",
            )?;
            let mut insert_assignment =
                tx.prepare("INSERT INTO happen_in (row_id, tract_id) VALUES (?1, ?2)")?;

            for (row_id, (stop, assignment)) in (1_i64..).zip(stops.iter().zip(&join.assignments)) {
                insert_stop.execute(params![
                    row_id,
                    stop.id,
                    stop
                        .timestamp
                        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string()),
                    stop.location.map(|p| p.x()),
                    stop.location.map(|p| p.y()),
                    stop.age,
                    stop.race.map(|r| r.label()),
                    stop.sex.map(|s| s.as_str()),
                    stop.search_conducted,
                    stop.frisk_performed,
                    stop.contraband_found,
                    stop.citation_issued,
                    stop.warning_issued,
                    stop.outcome,
                ])?;
                summary.stops += 1;

                if let Some(tract_id) = assignment.tract() {
                    insert_assignment.execute(params![row_id, tract_id.as_str()])?;
                    summary.assignments += 1;
                }
            }
        }

        let now = Utc::now().to_rfc3339();
        tx.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            (IMPORTED_AT_KEY, now),
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            (IMPORT_DIGEST_KEY, digest),
        )?;
        tx.commit()?;

        info!(
            stops = summary.stops,
            tracts = summary.tracts,
            assignments = summary.assignments,
            "Imported dataset"
        );
        Ok(summary)
    }

    /// Assigned stops per tract, computed in SQL over `happen_in`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stop_counts(&self) -> Result<BTreeMap<TractId, usize>> {
        let mut stmt = self.conn.prepare(
            "SELECT tract_id, COUNT(*) FROM happen_in GROUP BY tract_id ORDER BY tract_id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let id: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((id, count))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .map(|(id, count)| {
                (
                    TractId::from(id.as_str()),
                    usize::try_from(count).unwrap_or(0),
                )
            })
            .collect())
    }

    /// Read back the stored tracts in ascending id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or a stored boundary
    /// is not valid WKT.
    pub fn tracts(&self) -> Result<Vec<CensusTract>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT tract_id, county, population,
                   pct_white, pct_black, pct_hispanic, pct_aapi, pct_other, pct_bipoc,
                   median_age, median_income, pct_male, pct_college_educated,
                   pct_below_poverty, boundary_wkt
            FROM census_tracts ORDER BY tract_id
            ",
        )?;

        let rows = stmt
            .query_map([], |row| {
                let mut pct_race = [None; 6];
                for (i, slot) in pct_race.iter_mut().enumerate() {
                    *slot = row.get(3 + i)?;
                }
                let demographics = Demographics {
                    population: row.get(2)?,
                    pct_race,
                    median_age: row.get(9)?,
                    median_income: row.get(10)?,
                    pct_male: row.get(11)?,
                    pct_college_educated: row.get(12)?,
                    pct_below_poverty: row.get(13)?,
                };
                let id: String = row.get(0)?;
                let county: Option<String> = row.get(1)?;
                let wkt: String = row.get(14)?;
                Ok((id, county, demographics, wkt))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, county, demographics, wkt)| {
                let boundary = parse_boundary(&wkt).ok_or_else(|| {
                    Error::internal(format!("stored boundary for tract {id} is not valid WKT"))
                })?;
                Ok(CensusTract {
                    id: TractId::from(id.as_str()),
                    county,
                    demographics,
                    boundary,
                })
            })
            .collect()
    }

    /// Look up a cached value by input digest.
    ///
    /// A cached payload that no longer deserializes is treated as a miss.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn cache_get<T: DeserializeOwned>(&self, digest: &str) -> Result<Option<T>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload FROM table_cache WHERE digest = ?1",
                [digest],
                |row| row.get(0),
            )
            .optional()?;

        let Some(payload) = payload else {
            return Ok(None);
        };
        match serde_json::from_str(&payload) {
            Ok(value) => {
                debug!(digest, "Cache hit");
                Ok(Some(value))
            }
            Err(e) => {
                warn!(digest, error = %e, "Ignoring unreadable cache entry");
                Ok(None)
            }
        }
    }

    /// Store a value under an input digest, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database operation fails.
    pub fn cache_put<T: Serialize>(&self, digest: &str, value: &T) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO table_cache (digest, created_at, payload) VALUES (?1, ?2, ?3)",
            params![digest, Utc::now().to_rfc3339(), payload],
        )?;
        debug!(digest, "Cached table");
        Ok(())
    }

    /// Remove every cached table. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn cache_clear(&self) -> Result<usize> {
        let affected = self.conn.execute("DELETE FROM table_cache", [])?;
        if affected > 0 {
            info!("Cleared {} cached tables", affected);
        }
        Ok(affected)
    }

    fn count_rows(&self, table: &str) -> Result<i64> {
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count)
    }

    fn metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Get database statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<StorageStats> {
        let imported_at = self
            .metadata(IMPORTED_AT_KEY)?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(StorageStats {
            stops: self.count_rows("traffic_stops")?,
            tracts: self.count_rows("census_tracts")?,
            assignments: self.count_rows("happen_in")?,
            cached_tables: self.count_rows("table_cache")?,
            imported_at,
            import_digest: self.metadata(IMPORT_DIGEST_KEY)?,
            schema_version: migrations::get_schema_version(&self.conn)?,
            db_size_bytes,
        })
    }
}

/// Statistics about the storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Stored stop records.
    pub stops: i64,
    /// Stored tracts.
    pub tracts: i64,
    /// Stored stop-to-tract assignments.
    pub assignments: i64,
    /// Cached aggregate tables.
    pub cached_tables: i64,
    /// When the current dataset was imported.
    pub imported_at: Option<DateTime<Utc>>,
    /// Input digest of the current dataset.
    pub import_digest: Option<String>,
    /// Schema version.
    pub schema_version: i32,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Race;
    use crate::spatial::spatial_join;
    use geo::{polygon, MultiPolygon};
    use serde::Deserialize;

    fn create_test_storage() -> Storage {
        Storage::open_in_memory().expect("failed to create test storage")
    }

    fn square(id: &str, x0: f64) -> CensusTract {
        let poly = polygon![
            (x: x0, y: 0.0),
            (x: x0 + 1.0, y: 0.0),
            (x: x0 + 1.0, y: 1.0),
            (x: x0, y: 1.0),
            (x: x0, y: 0.0),
        ];
        let mut tract = CensusTract::new(TractId::from(id), MultiPolygon::new(vec![poly]));
        tract.county = Some("King".to_string());
        tract.demographics.population = Some(2500.0);
        tract.demographics.pct_race[RaceCategory::Black.index()] = Some(12.5);
        tract
    }

    fn fixture() -> (Vec<StopRecord>, Vec<CensusTract>) {
        let stops = vec![
            StopRecord::new("1").at(0.5, 0.5).with_race(Race::Black),
            StopRecord::new("2").at(0.2, 0.7).with_race(Race::White),
            StopRecord::new("3").at(1.5, 0.5),
            StopRecord::new("4").at(9.0, 9.0),
            StopRecord::new("5"),
        ];
        (stops, vec![square("1", 0.0), square("2", 1.0)])
    }

    #[test]
    fn test_open_in_memory() {
        let storage = Storage::open_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_import_and_stop_counts() {
        let mut storage = create_test_storage();
        let (stops, tracts) = fixture();
        let join = spatial_join(&stops, &tracts);

        let summary = storage.import(&stops, &tracts, &join, "abc").unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                stops: 5,
                tracts: 2,
                assignments: 3,
            }
        );

        let counts = storage.stop_counts().unwrap();
        assert_eq!(counts, join.stops_per_tract());
        assert_eq!(counts[&TractId::from("1")], 2);
    }

    #[test]
    fn test_import_replaces_previous_dataset() {
        let mut storage = create_test_storage();
        let (stops, tracts) = fixture();
        let join = spatial_join(&stops, &tracts);
        storage.import(&stops, &tracts, &join, "first").unwrap();

        let fewer = &stops[..1];
        let join = spatial_join(fewer, &tracts);
        storage.import(fewer, &tracts, &join, "second").unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.stops, 1);
        assert_eq!(stats.tracts, 2);
        assert_eq!(stats.assignments, 1);
        assert_eq!(stats.import_digest.as_deref(), Some("second"));
        assert!(stats.imported_at.is_some());
    }

    #[test]
    fn test_import_rejects_misaligned_join() {
        let mut storage = create_test_storage();
        let (stops, tracts) = fixture();
        let join = spatial_join(&stops[..2], &tracts);
        assert!(storage.import(&stops, &tracts, &join, "x").is_err());
        assert_eq!(storage.stats().unwrap().stops, 0);
    }

    #[test]
    fn test_tracts_round_trip_through_wkt() {
        let mut storage = create_test_storage();
        let (stops, tracts) = fixture();
        let join = spatial_join(&stops, &tracts);
        storage.import(&stops, &tracts, &join, "abc").unwrap();

        let stored = storage.tracts().unwrap();
        assert_eq!(stored, tracts);
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Payload {
        rows: Vec<u32>,
    }

    #[test]
    fn test_cache_put_get_clear() {
        let storage = create_test_storage();
        assert!(storage.cache_get::<Payload>("d1").unwrap().is_none());

        let payload = Payload { rows: vec![1, 2, 3] };
        storage.cache_put("d1", &payload).unwrap();
        assert_eq!(storage.cache_get::<Payload>("d1").unwrap(), Some(payload));
        assert_eq!(storage.stats().unwrap().cached_tables, 1);

        assert_eq!(storage.cache_clear().unwrap(), 1);
        assert!(storage.cache_get::<Payload>("d1").unwrap().is_none());
    }

    #[test]
    fn test_cache_unreadable_entry_is_miss() {
        let storage = create_test_storage();
        storage.cache_put("d1", &"not a payload").unwrap();
        assert!(storage.cache_get::<Payload>("d1").unwrap().is_none());
    }

    #[test]
    fn test_stats_empty() {
        let storage = create_test_storage();
        let stats = storage.stats().unwrap();
        assert_eq!(stats.stops, 0);
        assert_eq!(stats.cached_tables, 0);
        assert!(stats.imported_at.is_none());
        assert_eq!(stats.schema_version, migrations::CURRENT_VERSION);
        assert_eq!(stats.db_size_bytes, 0);
    }

    #[test]
    fn test_path() {
        let storage = create_test_storage();
        assert_eq!(storage.path().to_string_lossy(), ":memory:");
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let nested_path = dir.path().join("nested/deeper/tractstops.db");

        let storage = Storage::open(&nested_path).unwrap();
        assert!(nested_path.exists());
        assert_eq!(storage.path(), nested_path);
    }
}
