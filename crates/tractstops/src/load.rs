//! CSV ingestion for the stop and tract datasets.
//!
//! Every column is read as optional text and parsed leniently. A bad value
//! never aborts a load: the row is either kept with the field absent or
//! skipped, and the outcome is counted in a load report. Only file-level
//! problems (unreadable file, missing key column) are errors.

use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use geo::{BoundingRect, Geometry, MultiPolygon, Point, Simplify};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use wkt::Wkt;

use crate::error::{Error, Result};
use crate::model::{
    Activity, CensusTract, Demographics, Race, RaceCategory, RaceLabel, Sex, StopRecord, TractId,
};

/// Individual row warnings logged per file before going quiet.
const WARN_LIMIT: usize = 5;

/// Text values treated as missing.
const NA_MARKERS: &[&str] = &["na", "nan", "null", "none", "n/a"];

const STOP_ID_COLUMNS: &[&str] = &["raw_row_number", "stop_id", "StopID"];
const LAT_COLUMNS: &[&str] = &["lat", "latitude", "Latitude"];
const LNG_COLUMNS: &[&str] = &["lng", "lon", "longitude", "Longitude"];
const TRACT_ID_COLUMNS: &[&str] = &["TractID", "GEOID", "tract_id"];
const GEOMETRY_COLUMNS: &[&str] = &["geometry", "Geometry"];

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Counts describing how a stop file was loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopLoadReport {
    /// Data rows encountered.
    pub rows_read: usize,
    /// Records kept after loading and filtering.
    pub rows_kept: usize,
    /// Rows that could not be decoded at all.
    pub malformed_rows: usize,
    /// Kept records whose timestamp could not be parsed.
    pub bad_timestamps: usize,
    /// Kept records whose race label was not recognized.
    pub unrecognized_races: usize,
    /// Records dropped by an hour-of-day filter.
    pub outside_hour: usize,
}

/// Counts describing how a tract file was loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TractLoadReport {
    /// Data rows encountered.
    pub rows_read: usize,
    /// Tracts kept after loading and scoping.
    pub rows_kept: usize,
    /// Rows that could not be decoded at all.
    pub malformed_rows: usize,
    /// Rows without a tract identifier.
    pub missing_ids: usize,
    /// Rows whose boundary was missing or not a polygon.
    pub invalid_geometries: usize,
    /// Rows repeating an identifier seen earlier in the file.
    pub duplicate_ids: usize,
    /// Tracts dropped by county scoping.
    pub out_of_scope: usize,
}

/// Loaded stop records.
#[derive(Debug, Clone, Default)]
pub struct StopTable {
    /// Records in file order.
    pub records: Vec<StopRecord>,
    /// Load counts.
    pub report: StopLoadReport,
}

/// Loaded census tracts, sorted by identifier.
#[derive(Debug, Clone, Default)]
pub struct TractTable {
    /// Tracts in ascending id order; ids are unique.
    pub tracts: Vec<CensusTract>,
    /// Load counts.
    pub report: TractLoadReport,
}

/// Header positions of one logical field, in priority order.
///
/// A field may be spelled several ways across exports; a header can carry
/// more than one spelling. Each row reads the first non-missing cell.
#[derive(Debug, Clone, Default)]
struct Field(Vec<usize>);

impl Field {
    fn resolve(headers: &StringRecord, names: &[&str]) -> Self {
        Self(
            names
                .iter()
                .filter_map(|name| headers.iter().position(|h| h == *name))
                .collect(),
        )
    }

    fn is_present(&self) -> bool {
        !self.0.is_empty()
    }

    fn get<'r>(&self, record: &'r StringRecord) -> Option<&'r str> {
        self.0.iter().find_map(|&i| present(record.get(i)))
    }
}

#[derive(Debug)]
struct StopColumns {
    id: Field,
    date_time: Field,
    date: Field,
    time: Field,
    geometry: Field,
    lat: Field,
    lng: Field,
    age: Field,
    race: Field,
    sex: Field,
    flags: [(Activity, Field); 5],
    outcome: Field,
}

impl StopColumns {
    fn resolve(headers: &StringRecord) -> Self {
        let field = |names: &[&str]| Field::resolve(headers, names);
        Self {
            id: field(STOP_ID_COLUMNS),
            date_time: field(&["date_time", "DateTime"]),
            date: field(&["date", "Date"]),
            time: field(&["time", "Time"]),
            geometry: field(GEOMETRY_COLUMNS),
            lat: field(LAT_COLUMNS),
            lng: field(LNG_COLUMNS),
            age: field(&["subject_age", "SubjectAge"]),
            race: field(&["subject_race", "SubjectRace"]),
            sex: field(&["subject_sex", "SubjectSex"]),
            flags: [
                (Activity::Searched, field(&["search_conducted", "SearchConducted"])),
                (Activity::Frisked, field(&["frisk_performed", "FriskPerformed"])),
                (Activity::ContrabandFound, field(&["contraband_found", "ContrabandFound"])),
                (Activity::Citation, field(&["citation_issued", "CitationIssued"])),
                (Activity::Warning, field(&["warning_issued", "WarningIssued"])),
            ],
            outcome: field(&["outcome", "Outcome"]),
        }
    }

    fn has_location(&self) -> bool {
        self.geometry.is_present() || (self.lat.is_present() && self.lng.is_present())
    }

    fn timestamp_text(&self, record: &StringRecord) -> Option<String> {
        if let Some(text) = self.date_time.get(record) {
            return Some(text.to_string());
        }
        match (self.date.get(record), self.time.get(record)) {
            (Some(date), Some(time)) => Some(format!("{date} {time}")),
            (Some(date), None) => Some(date.to_string()),
            _ => None,
        }
    }

    fn location(&self, record: &StringRecord) -> Option<Point<f64>> {
        let point = match self.geometry.get(record) {
            Some(text) => match parse_geometry(text)? {
                Geometry::Point(point) => point,
                _ => return None,
            },
            None => Point::new(
                parse_number(self.lng.get(record))?,
                parse_number(self.lat.get(record))?,
            ),
        };
        valid_coordinate(point).then_some(point)
    }

    fn record(&self, record: &StringRecord, row: usize, report: &mut StopLoadReport) -> StopRecord {
        let id = self.id.get(record).map_or_else(|| row.to_string(), str::to_string);
        let mut stop = StopRecord::new(id);

        if let Some(text) = self.timestamp_text(record) {
            stop.timestamp = parse_timestamp(&text);
            if stop.timestamp.is_none() {
                report.bad_timestamps += 1;
            }
        }

        stop.location = self.location(record);
        stop.age = parse_age(self.age.get(record));
        let label = self.race.get(record);
        stop.race = match label.map(Race::classify) {
            Some(RaceLabel::Known(race)) => Some(race),
            Some(RaceLabel::Unrecognized) => {
                report.unrecognized_races += 1;
                debug!(row, label = ?label, "Unrecognized race label");
                None
            }
            Some(RaceLabel::Unknown) | None => None,
        };
        stop.sex = self.sex.get(record).and_then(Sex::parse);

        for (activity, field) in &self.flags {
            *stop.flag_mut(*activity) = parse_flag(field.get(record));
        }

        stop.outcome = self.outcome.get(record).map(str::to_string);
        stop
    }
}

#[derive(Debug)]
struct TractColumns {
    id: Field,
    county: Field,
    population: Field,
    pct_race: [(RaceCategory, Field); 6],
    median_age: Field,
    median_income: Field,
    pct_male: Field,
    pct_college_educated: Field,
    pct_below_poverty: Field,
    geometry: Field,
}

impl TractColumns {
    fn resolve(headers: &StringRecord) -> Self {
        let field = |names: &[&str]| Field::resolve(headers, names);
        Self {
            id: field(TRACT_ID_COLUMNS),
            county: field(&["County", "county"]),
            population: field(&["TotalPopulation", "Population"]),
            pct_race: [
                (RaceCategory::White, field(&["PctWhite", "%White"])),
                (RaceCategory::Black, field(&["PctBlack", "%Black"])),
                (RaceCategory::Hispanic, field(&["PctHispanic", "%Hispanic"])),
                (RaceCategory::Aapi, field(&["PctAAPI", "%AAPI"])),
                (RaceCategory::Other, field(&["PctOther", "%Other"])),
                (RaceCategory::Bipoc, field(&["PctBIPOC", "%BIPOC"])),
            ],
            median_age: field(&["MedianAge"]),
            median_income: field(&["MedianIncome"]),
            pct_male: field(&["PctMale", "%Male"]),
            pct_college_educated: field(&["PctCollegeEducated", "%CollegeEducated", "PctBachelors"]),
            pct_below_poverty: field(&["PctBelowPoverty", "%BelowPoverty"]),
            geometry: field(GEOMETRY_COLUMNS),
        }
    }

    fn demographics(&self, record: &StringRecord) -> Demographics {
        let number = |field: &Field| parse_number(field.get(record));
        let mut pct_race = [None; 6];
        for (category, field) in &self.pct_race {
            pct_race[category.index()] = number(field);
        }
        Demographics {
            population: number(&self.population),
            pct_race,
            median_age: number(&self.median_age),
            median_income: number(&self.median_income),
            pct_male: number(&self.pct_male),
            pct_college_educated: number(&self.pct_college_educated),
            pct_below_poverty: number(&self.pct_below_poverty),
        }
    }
}

/// Load stop records from a CSV file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or has no coordinate columns.
pub fn load_stops(path: impl AsRef<Path>) -> Result<StopTable> {
    let path = path.as_ref();
    let file = open(path)?;
    read_stops(file, path)
}

/// Read stop records from any CSV source. `origin` names the source in errors.
///
/// A stop needs either a WKT `geometry` column or `lat`/`lng` columns.
///
/// # Errors
///
/// Returns an error if the header cannot be read or has no coordinate columns.
pub fn read_stops<R: Read>(reader: R, origin: &Path) -> Result<StopTable> {
    let mut rdr = csv_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|source| csv_error(origin, source))?
        .clone();

    let columns = StopColumns::resolve(&headers);
    if !columns.has_location() {
        return Err(Error::MissingColumn {
            path: origin.to_path_buf(),
            column: "geometry",
        });
    }

    let mut report = StopLoadReport::default();
    let mut records = Vec::new();
    for (index, result) in rdr.records().enumerate() {
        let row = index + 1;
        report.rows_read += 1;
        match result {
            Ok(record) => records.push(columns.record(&record, row, &mut report)),
            Err(e) => {
                report.malformed_rows += 1;
                if report.malformed_rows <= WARN_LIMIT {
                    warn!(row, error = %e, "Skipping malformed stop row");
                }
            }
        }
    }
    report.rows_kept = records.len();

    info!(
        source = %origin.display(),
        kept = report.rows_kept,
        malformed = report.malformed_rows,
        "Loaded stop records"
    );
    Ok(StopTable { records, report })
}

/// Load census tracts from a CSV file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or lacks an id or geometry column.
pub fn load_tracts(path: impl AsRef<Path>) -> Result<TractTable> {
    let path = path.as_ref();
    let file = open(path)?;
    read_tracts(file, path)
}

/// Read census tracts from any CSV source. `origin` names the source in errors.
///
/// # Errors
///
/// Returns an error if the header cannot be read or lacks an id or geometry column.
pub fn read_tracts<R: Read>(reader: R, origin: &Path) -> Result<TractTable> {
    let mut rdr = csv_reader(reader);
    let headers = rdr
        .headers()
        .map_err(|source| csv_error(origin, source))?
        .clone();

    let columns = TractColumns::resolve(&headers);
    if !columns.id.is_present() {
        return Err(Error::MissingColumn {
            path: origin.to_path_buf(),
            column: "TractID",
        });
    }
    if !columns.geometry.is_present() {
        return Err(Error::MissingColumn {
            path: origin.to_path_buf(),
            column: "geometry",
        });
    }

    let mut report = TractLoadReport::default();
    let mut seen = HashSet::new();
    let mut tracts = Vec::new();

    for (index, result) in rdr.records().enumerate() {
        let row = index + 1;
        report.rows_read += 1;

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                report.malformed_rows += 1;
                if report.malformed_rows <= WARN_LIMIT {
                    warn!(row, error = %e, "Skipping malformed tract row");
                }
                continue;
            }
        };

        let Some(id) = columns.id.get(&record).and_then(TractId::parse) else {
            report.missing_ids += 1;
            continue;
        };

        let Some(boundary) = columns.geometry.get(&record).and_then(parse_boundary) else {
            report.invalid_geometries += 1;
            if report.invalid_geometries <= WARN_LIMIT {
                warn!(row, tract = %id, "Skipping tract with invalid boundary");
            }
            continue;
        };

        if !seen.insert(id.clone()) {
            report.duplicate_ids += 1;
            warn!(row, tract = %id, "Skipping duplicate tract id");
            continue;
        }

        tracts.push(CensusTract {
            demographics: columns.demographics(&record),
            county: columns.county.get(&record).map(str::to_string),
            id,
            boundary,
        });
    }

    tracts.sort_by(|a, b| a.id.cmp(&b.id));
    report.rows_kept = tracts.len();

    info!(
        source = %origin.display(),
        kept = report.rows_kept,
        invalid_geometries = report.invalid_geometries,
        duplicates = report.duplicate_ids,
        "Loaded census tracts"
    );
    Ok(TractTable { tracts, report })
}

impl StopTable {
    /// Keep only stops made during the given hour of day.
    ///
    /// Stops without a timestamp are dropped too.
    pub fn retain_hour(&mut self, hour: u32) {
        let before = self.records.len();
        self.records.retain(|stop| stop.hour() == Some(hour));
        let dropped = before - self.records.len();
        self.report.outside_hour += dropped;
        self.report.rows_kept = self.records.len();
        debug!(hour, dropped, "Applied hour-of-day filter");
    }
}

impl TractTable {
    /// Keep only tracts in the named county (case-insensitive).
    pub fn scope_to_county(&mut self, county: &str) {
        let wanted = county.trim();
        let before = self.tracts.len();
        self.tracts.retain(|tract| {
            tract
                .county
                .as_deref()
                .is_some_and(|c| c.trim().eq_ignore_ascii_case(wanted))
        });
        let dropped = before - self.tracts.len();
        self.report.out_of_scope += dropped;
        self.report.rows_kept = self.tracts.len();
        debug!(county = wanted, dropped, "Scoped tracts to county");
    }

    /// Simplify every boundary (Douglas-Peucker) with the given tolerance in degrees.
    ///
    /// A tolerance of zero leaves boundaries untouched.
    pub fn simplify(&mut self, tolerance: f64) {
        if tolerance <= 0.0 {
            return;
        }
        for tract in &mut self.tracts {
            tract.boundary = tract.boundary.simplify(&tolerance);
        }
        debug!(tolerance, tracts = self.tracts.len(), "Simplified tract boundaries");
    }

    /// Look up a tract by id.
    #[must_use]
    pub fn get(&self, id: &TractId) -> Option<&CensusTract> {
        self.tracts
            .binary_search_by(|tract| tract.id.cmp(id))
            .ok()
            .map(|i| &self.tracts[i])
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| csv_error(path, csv::Error::from(e)))
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader)
}

fn csv_error(path: &Path, source: csv::Error) -> Error {
    Error::CsvRead {
        path: PathBuf::from(path),
        source,
    }
}

/// Trimmed text, or `None` for blank and NA-style markers.
fn present(raw: Option<&str>) -> Option<&str> {
    let text = raw?.trim();
    if text.is_empty() || NA_MARKERS.iter().any(|m| text.eq_ignore_ascii_case(m)) {
        None
    } else {
        Some(text)
    }
}

/// Parse a number, tolerating thousands separators and a trailing `%`.
pub(crate) fn parse_number(raw: Option<&str>) -> Option<f64> {
    let text = present(raw)?.trim_end_matches('%').replace(',', "");
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_age(raw: Option<&str>) -> Option<u32> {
    let value = parse_number(raw)?;
    (0.0..=130.0).contains(&value).then(|| value.trunc() as u32)
}

fn parse_flag(raw: Option<&str>) -> Option<bool> {
    match present(raw)?.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" | "1.0" => Some(true),
        "false" | "f" | "no" | "n" | "0" | "0.0" => Some(false),
        _ => None,
    }
}

/// Parse an ISO-style timestamp into local (naive) time.
pub(crate) fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn parse_geometry(text: &str) -> Option<Geometry<f64>> {
    let wkt = Wkt::<f64>::from_str(text).ok()?;
    Geometry::try_from(wkt).ok()
}

pub(crate) fn parse_boundary(text: &str) -> Option<MultiPolygon<f64>> {
    let boundary = match parse_geometry(text)? {
        Geometry::Polygon(polygon) => MultiPolygon::new(vec![polygon]),
        Geometry::MultiPolygon(multi) => multi,
        _ => return None,
    };
    boundary.bounding_rect().is_some().then_some(boundary)
}

fn valid_coordinate(point: Point<f64>) -> bool {
    let (lon, lat) = (point.x(), point.y());
    lon.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(&lon)
        && (-90.0..=90.0).contains(&lat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn origin() -> &'static Path {
        Path::new("<test>")
    }

    const STOP_HEADER: &str = "raw_row_number,date_time,geometry,subject_age,subject_race,subject_sex,search_conducted,frisk_performed,contraband_found,citation_issued,warning_issued,outcome";

    #[test]
    fn test_read_stops_full_row() {
        let csv = format!(
            "{STOP_HEADER}\n7,2018-05-01 13:20:00,POINT (-122.3 47.6),34,black,male,True,False,NA,True,False,citation\n"
        );
        let table = read_stops(csv.as_bytes(), origin()).unwrap();
        assert_eq!(table.report.rows_read, 1);
        assert_eq!(table.report.rows_kept, 1);

        let stop = &table.records[0];
        assert_eq!(stop.id, "7");
        assert_eq!(stop.race, Some(Race::Black));
        assert_eq!(stop.sex, Some(Sex::Male));
        assert_eq!(stop.age, Some(34));
        assert_eq!(stop.hour(), Some(13));
        assert!(stop.flag(Activity::Searched));
        assert!(!stop.flag(Activity::Frisked));
        assert_eq!(stop.contraband_found, None);
        assert!(stop.flag(Activity::Citation));
        assert_eq!(stop.outcome.as_deref(), Some("citation"));
        let point = stop.location.unwrap();
        assert!((point.x() + 122.3).abs() < 1e-9);
        assert!((point.y() - 47.6).abs() < 1e-9);
    }

    #[test]
    fn test_read_stops_lat_lng_columns() {
        let csv = "date,time,lat,lng,subject_race\n2018-01-02,08:15:00,47.5,-122.2,white\n";
        let table = read_stops(csv.as_bytes(), origin()).unwrap();
        let stop = &table.records[0];
        assert_eq!(stop.id, "1");
        assert_eq!(stop.hour(), Some(8));
        assert_eq!(stop.location, Some(Point::new(-122.2, 47.5)));
    }

    #[test]
    fn test_malformed_coordinate_kept_without_location() {
        let csv = "geometry,subject_race\nPOINT (oops),white\nPOINT (-200 47),black\n,hispanic\n";
        let table = read_stops(csv.as_bytes(), origin()).unwrap();
        assert_eq!(table.records.len(), 3);
        assert!(table.records.iter().all(|s| s.location.is_none()));
    }

    #[test]
    fn test_missing_coordinate_columns_is_error() {
        let csv = "subject_race\nwhite\n";
        let err = read_stops(csv.as_bytes(), origin()).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { column: "geometry", .. }));
    }

    #[test]
    fn test_bad_timestamp_and_race_counted() {
        let csv = "geometry,date_time,subject_race\nPOINT (1 1),yesterday,martian\nPOINT (1 1),NA,unknown\n";
        let table = read_stops(csv.as_bytes(), origin()).unwrap();
        assert_eq!(table.report.bad_timestamps, 1);
        assert_eq!(table.report.unrecognized_races, 1);
        assert!(table.records.iter().all(|s| s.race.is_none()));
    }

    #[test]
    fn test_ragged_row_counted_as_malformed() {
        let csv = "geometry,subject_race\nPOINT (1 1),white\nPOINT (1 1),white,extra\n";
        let table = read_stops(csv.as_bytes(), origin()).unwrap();
        assert_eq!(table.report.rows_read, 2);
        assert_eq!(table.report.malformed_rows, 1);
        assert_eq!(table.report.rows_kept, 1);
    }

    #[test]
    fn test_stop_id_columns_both_present() {
        let csv = "raw_row_number,stop_id,geometry,subject_race\n\
                   11,a,POINT (0.5 0.5),black\n\
                   ,b,POINT (0.5 0.5),white\n\
                   ,,POINT (0.5 0.5),white\n";
        let table = read_stops(csv.as_bytes(), origin()).unwrap();
        assert_eq!(table.report.malformed_rows, 0);
        assert_eq!(table.report.rows_kept, 3);
        let ids: Vec<&str> = table.records.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["11", "b", "3"]);
        assert_eq!(table.records[0].race, Some(Race::Black));
    }

    #[test]
    fn test_coordinate_spellings_both_present() {
        let csv = "lat,latitude,lng,Longitude,Geometry,geometry\n\
                   47.5,0,-122.2,0,,\n\
                   ,47.6,,-122.3,,\n\
                   ,,,,POINT (1 2),POINT (3 4)\n";
        let table = read_stops(csv.as_bytes(), origin()).unwrap();
        assert_eq!(table.report.malformed_rows, 0);
        let points: Vec<_> = table.records.iter().map(|s| s.location).collect();
        assert_eq!(
            points,
            [
                Some(Point::new(-122.2, 47.5)),
                Some(Point::new(-122.3, 47.6)),
                Some(Point::new(3.0, 4.0)),
            ]
        );
    }

    #[test]
    fn test_retain_hour() {
        let csv = "geometry,date_time\nPOINT (1 1),2018-01-01 12:00:00\nPOINT (1 1),2018-01-01 13:00:00\nPOINT (1 1),\n";
        let mut table = read_stops(csv.as_bytes(), origin()).unwrap();
        table.retain_hour(12);
        assert_eq!(table.records.len(), 1);
        assert_eq!(table.report.outside_hour, 2);
        assert_eq!(table.report.rows_kept, 1);
    }

    const TRACT_HEADER: &str = "TractID,County,TotalPopulation,PctWhite,PctBlack,PctHispanic,PctAAPI,PctOther,PctBIPOC,MedianAge,MedianIncome,PctMale,PctCollegeEducated,PctBelowPoverty,geometry";

    #[test]
    fn test_read_tracts_sorted_and_parsed() {
        let csv = format!(
            "{TRACT_HEADER}\n\
             53033000200.0,King,4000,60,10,10,15,5,40,35.5,\"85,000\",49.1,55.2,8.3,\"POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))\"\n\
             53033000100,King,3000,70,5,5,15,5,30,40,90000,50,60,5,\"MULTIPOLYGON (((1 0, 2 0, 2 1, 1 1, 1 0)))\"\n"
        );
        let table = read_tracts(csv.as_bytes(), origin()).unwrap();
        assert_eq!(table.tracts.len(), 2);
        assert_eq!(table.tracts[0].id.as_str(), "53033000100");
        assert_eq!(table.tracts[1].id.as_str(), "53033000200");

        let demo = &table.tracts[1].demographics;
        assert_eq!(demo.population, Some(4000.0));
        assert_eq!(demo.median_income, Some(85_000.0));
        assert_eq!(demo.pct(RaceCategory::Bipoc), Some(40.0));
        assert_eq!(table.tracts[1].county.as_deref(), Some("King"));
    }

    #[test]
    fn test_read_tracts_rejects_bad_rows() {
        let csv = "TractID,geometry\n\
                   1,\"POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))\"\n\
                   1,\"POLYGON ((5 5, 6 5, 6 6, 5 6, 5 5))\"\n\
                   2,POINT (1 1)\n\
                   ,\"POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))\"\n\
                   3,not wkt\n";
        let table = read_tracts(csv.as_bytes(), origin()).unwrap();
        assert_eq!(table.tracts.len(), 1);
        assert_eq!(table.report.duplicate_ids, 1);
        assert_eq!(table.report.invalid_geometries, 2);
        assert_eq!(table.report.missing_ids, 1);
        // First occurrence wins.
        let kept = &table.tracts[0];
        assert!(kept.boundary.bounding_rect().unwrap().max().x <= 1.0);
    }

    #[test]
    fn test_tract_id_spellings_both_present() {
        let csv = "TractID,GEOID,County,county,geometry,Geometry\n\
                   1,53033000100,King,,\"POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))\",\n\
                   ,53033000200,,Pierce,,\"POLYGON ((1 0, 2 0, 2 1, 1 1, 1 0))\"\n";
        let table = read_tracts(csv.as_bytes(), origin()).unwrap();
        assert_eq!(table.report.malformed_rows, 0);
        assert_eq!(table.report.rows_kept, 2);
        assert_eq!(table.tracts[0].id.as_str(), "1");
        assert_eq!(table.tracts[0].county.as_deref(), Some("King"));
        assert_eq!(table.tracts[1].id.as_str(), "53033000200");
        assert_eq!(table.tracts[1].county.as_deref(), Some("Pierce"));
    }

    #[test]
    fn test_read_tracts_requires_id_column() {
        let csv = "geometry\n\"POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))\"\n";
        let err = read_tracts(csv.as_bytes(), origin()).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { column: "TractID", .. }));
    }

    #[test]
    fn test_scope_to_county() {
        let csv = "TractID,County,geometry\n\
                   1,King,\"POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))\"\n\
                   2,Pierce,\"POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))\"\n\
                   3,,\"POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))\"\n";
        let mut table = read_tracts(csv.as_bytes(), origin()).unwrap();
        table.scope_to_county("king");
        assert_eq!(table.tracts.len(), 1);
        assert_eq!(table.report.out_of_scope, 2);
        assert!(table.get(&TractId::from("1")).is_some());
        assert!(table.get(&TractId::from("2")).is_none());
    }

    #[test]
    fn test_simplify_zero_is_noop() {
        let csv = "TractID,geometry\n1,\"POLYGON ((0 0, 0.5 0.00001, 1 0, 1 1, 0 1, 0 0))\"\n";
        let mut table = read_tracts(csv.as_bytes(), origin()).unwrap();
        let before = table.tracts[0].boundary.clone();
        table.simplify(0.0);
        assert_eq!(table.tracts[0].boundary, before);
        table.simplify(0.001);
        assert_ne!(table.tracts[0].boundary, before);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert_eq!(
            parse_timestamp("2018-06-01T22:10:00").map(|t| t.hour()),
            Some(22)
        );
        assert_eq!(
            parse_timestamp("2018-06-01 22:10").map(|t| t.hour()),
            Some(22)
        );
        assert_eq!(
            parse_timestamp("2018-06-01T22:10:00-07:00").map(|t| t.hour()),
            Some(22)
        );
        assert_eq!(parse_timestamp("2018-06-01").map(|t| t.hour()), Some(0));
        assert!(parse_timestamp("June first").is_none());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(Some(" 12.5% ")), Some(12.5));
        assert_eq!(parse_number(Some("1,234")), Some(1234.0));
        assert_eq!(parse_number(Some("NA")), None);
        assert_eq!(parse_number(Some("nan")), None);
        assert_eq!(parse_number(Some("inf")), None);
        assert_eq!(parse_number(None), None);
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag(Some("TRUE")), Some(true));
        assert_eq!(parse_flag(Some("0")), Some(false));
        assert_eq!(parse_flag(Some("NA")), None);
        assert_eq!(parse_flag(Some("maybe")), None);
    }

    #[test]
    fn test_parse_age_bounds() {
        assert_eq!(parse_age(Some("34.0")), Some(34));
        assert_eq!(parse_age(Some("-3")), None);
        assert_eq!(parse_age(Some("999")), None);
    }
}
