//! `SQLite` schema definitions for tractstops.
//!
//! The three data tables mirror the relational model of the analysis:
//! `traffic_stops`, `census_tracts`, and the `happen_in` relation between
//! them. `table_cache` holds memoized aggregate tables.

/// SQL statement to create the stops table.
pub const CREATE_TRAFFIC_STOPS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS traffic_stops (
    row_id INTEGER PRIMARY KEY,
    stop_id TEXT NOT NULL,
    date_time TEXT,
    lon REAL,
    lat REAL,
    subject_age INTEGER,
    subject_race TEXT,
    subject_sex TEXT,
    search_conducted INTEGER,
    frisk_performed INTEGER,
    contraband_found INTEGER,
    citation_issued INTEGER,
    warning_issued INTEGER,
    outcome TEXT
)
";

/// SQL statement to create the tracts table. Boundaries are stored as WKT.
pub const CREATE_CENSUS_TRACTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS census_tracts (
    tract_id TEXT PRIMARY KEY,
    county TEXT,
    population REAL,
    pct_white REAL,
    pct_black REAL,
    pct_hispanic REAL,
    pct_aapi REAL,
    pct_other REAL,
    pct_bipoc REAL,
    median_age REAL,
    median_income REAL,
    pct_male REAL,
    pct_college_educated REAL,
    pct_below_poverty REAL,
    boundary_wkt TEXT NOT NULL
)
";

/// SQL statement to create the stop-to-tract relation.
pub const CREATE_HAPPEN_IN_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS happen_in (
    row_id INTEGER PRIMARY KEY REFERENCES traffic_stops(row_id) ON DELETE CASCADE,
    tract_id TEXT NOT NULL REFERENCES census_tracts(tract_id) ON DELETE CASCADE
)
";

/// SQL statement to create an index on `happen_in.tract_id` for per-tract counts.
pub const CREATE_HAPPEN_IN_TRACT_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_happen_in_tract ON happen_in(tract_id)
";

/// SQL statement to create the metadata table for storing key-value pairs.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// SQL statement to create the memoized table cache (schema version 2).
pub const CREATE_TABLE_CACHE: &str = r"
CREATE TABLE IF NOT EXISTS table_cache (
    digest TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    payload TEXT NOT NULL
)
";

/// Base schema statements (version 1) in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_TRAFFIC_STOPS_TABLE,
    CREATE_CENSUS_TRACTS_TABLE,
    CREATE_HAPPEN_IN_TABLE,
    CREATE_HAPPEN_IN_TRACT_INDEX,
    CREATE_METADATA_TABLE,
];
