//! End-to-end runs over CSV fixtures written to a temporary directory.

#![allow(clippy::float_cmp)]

use std::fs;
use std::path::PathBuf;

use approx::assert_relative_eq;
use tempfile::TempDir;

use tractstops::model::{Activity, RaceCategory, TractId};
use tractstops::pipeline::{Analysis, AnalysisOptions, Dataset, Inputs};
use tractstops::{Column, Error, JoinPolicy, Storage};

const TRACT_HEADER: &str =
    "TractID,County,TotalPopulation,PctWhite,PctBlack,PctHispanic,PctAAPI,PctOther,PctBIPOC,geometry";

/// WKT for the unit square with its lower-left corner at `(x, 0)`.
fn unit_square(x: u32) -> String {
    let x1 = x + 1;
    format!("\"POLYGON (({x} 0, {x1} 0, {x1} 1, {x} 1, {x} 0))\"")
}

fn tract_row(id: &str, county: &str, pct_white: f64, pct_black: f64, x: u32) -> String {
    let bipoc = 100.0 - pct_white;
    let other = 100.0 - pct_white - pct_black;
    format!(
        "{id},{county},1000,{pct_white},{pct_black},0,0,{other},{bipoc},{}",
        unit_square(x)
    )
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new(stops: &str, tracts: &[String]) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("stops.csv"), stops).unwrap();
        let mut contents = String::from(TRACT_HEADER);
        for row in tracts {
            contents.push('\n');
            contents.push_str(row);
        }
        contents.push('\n');
        fs::write(dir.path().join("tracts.csv"), contents).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn inputs(&self) -> Inputs {
        Inputs::read(self.path("stops.csv"), self.path("tracts.csv")).unwrap()
    }

    fn run(&self, options: &AnalysisOptions) -> Analysis {
        Analysis::run(&self.inputs(), options).unwrap()
    }
}

const STOPS: &str = "\
raw_row_number,date_time,lat,lng,subject_race,search_conducted,frisk_performed,citation_issued
1,2018-03-01T08:15:00,0.5,0.5,black,TRUE,FALSE,TRUE
2,2018-03-01T08:45:00,0.5,0.5,black,FALSE,FALSE,TRUE
3,2018-03-01T17:00:00,0.25,0.75,white,FALSE,FALSE,FALSE
4,2018-03-02T02:00:00,NA,NA,white,FALSE,FALSE,FALSE
5,2018-03-02T03:00:00,5.5,0.5,hispanic,FALSE,FALSE,FALSE
";

fn two_tracts() -> Vec<String> {
    vec![
        tract_row("53033000100", "King", 60.0, 20.0, 0),
        tract_row("53033000200", "King", 70.0, 10.0, 1),
    ]
}

#[test]
fn black_black_white_gives_two_thirds() {
    let fixture = Fixture::new(STOPS, &two_tracts());
    let analysis = fixture.run(&AnalysisOptions::default());

    let row = analysis.table.get(&TractId::from("53033000100")).unwrap();
    assert_eq!(row.stops, 3);
    assert_relative_eq!(
        row.value(Column::StopsPct(RaceCategory::Black)).unwrap(),
        66.67,
        epsilon = 0.01
    );
    assert_relative_eq!(
        row.value(Column::StopsPct(RaceCategory::White)).unwrap(),
        33.33,
        epsilon = 0.01
    );
    assert_relative_eq!(
        row.value(Column::StopsPctActivity(Activity::Citation)).unwrap(),
        66.67,
        epsilon = 0.01
    );
}

#[test]
fn zero_stop_tract_has_no_stop_percentages() {
    let fixture = Fixture::new(STOPS, &two_tracts());
    let analysis = fixture.run(&AnalysisOptions::default());

    let empty = analysis.table.get(&TractId::from("53033000200")).unwrap();
    assert_eq!(empty.stops, 0);
    for race in RaceCategory::ALL {
        assert_eq!(empty.value(Column::StopsPct(race)), None);
    }
    for activity in Activity::ALL {
        assert_eq!(empty.value(Column::StopsPctActivity(activity)), None);
    }
    assert_eq!(empty.value(Column::TractPct(RaceCategory::White)), Some(70.0));
}

#[test]
fn excluded_stops_are_counted_not_dropped() {
    let fixture = Fixture::new(STOPS, &two_tracts());
    let report = fixture.run(&AnalysisOptions::default()).report;

    assert_eq!(report.stops.rows_read, 5);
    assert_eq!(report.join.stops, 5);
    assert_eq!(report.join.assigned, 3);
    assert_eq!(report.join.invalid_coordinates, 1);
    assert_eq!(report.join.unassigned, 1);
    assert_eq!(
        report.join.assigned + report.join.invalid_coordinates + report.join.unassigned,
        report.join.stops
    );
}

#[test]
fn inner_join_drops_zero_stop_tracts() {
    let fixture = Fixture::new(STOPS, &two_tracts());
    let options = AnalysisOptions {
        policy: JoinPolicy::Inner,
        ..AnalysisOptions::default()
    };
    let analysis = fixture.run(&options);
    assert_eq!(analysis.table.len(), 1);
    assert_eq!(analysis.report.disparity.tracts_without_stops, 1);
}

#[test]
fn shared_boundary_assignment_is_reproducible() {
    // x = 1 is the edge shared by both squares.
    let stops = "stop_id,lat,lng,subject_race\nedge,0.5,1.0,black\n";
    let fixture = Fixture::new(stops, &two_tracts());

    let first = fixture.run(&AnalysisOptions::default());
    for _ in 0..5 {
        let again = fixture.run(&AnalysisOptions::default());
        assert_eq!(again.table, first.table);
    }

    let dataset = Dataset::load(&fixture.inputs(), &AnalysisOptions::default()).unwrap();
    let join = dataset.spatial_join();
    assert_eq!(
        join.assignments[0].tract(),
        Some(&TractId::from("53033000100"))
    );
    assert_eq!(join.report.assigned, 1);
    assert_eq!(join.report.ambiguous, 1);
}

#[test]
fn identical_shares_fit_slope_one_intercept_zero() {
    let tracts = vec![
        tract_row("1", "King", 50.0, 50.0, 0),
        tract_row("2", "King", 75.0, 25.0, 1),
        tract_row("3", "King", 0.0, 100.0, 2),
    ];
    let stops = "\
stop_id,lat,lng,subject_race
a,0.5,0.5,black
b,0.5,0.5,white
c,0.5,1.5,black
d,0.5,1.5,white
e,0.5,1.5,white
f,0.5,1.5,white
g,0.5,2.5,black
";
    let fixture = Fixture::new(stops, &tracts);
    let table = fixture.run(&AnalysisOptions::default()).table;

    assert_eq!(
        table.column(Column::StopsPct(RaceCategory::Black)),
        table.column(Column::TractPct(RaceCategory::Black))
    );
    let fit = table
        .race_fit(RaceCategory::Black, RaceCategory::Black)
        .unwrap();
    assert_eq!(fit.slope, 1.0);
    assert_eq!(fit.intercept, 0.0);
    assert_eq!(fit.n, 3);
}

#[test]
fn single_tract_fit_reports_insufficient_data() {
    let fixture = Fixture::new(STOPS, &two_tracts());
    let options = AnalysisOptions {
        policy: JoinPolicy::Inner,
        ..AnalysisOptions::default()
    };
    let table = fixture.run(&options).table;

    let err = table
        .race_fit(RaceCategory::Black, RaceCategory::Black)
        .unwrap_err();
    assert!(matches!(err, Error::InsufficientData { found: 1, .. }));
    assert!(err.is_fit_unavailable());
}

#[test]
fn county_scope_and_hour_filter_compose() {
    let mut tracts = two_tracts();
    tracts.push(tract_row("53053000100", "Pierce", 50.0, 30.0, 5));
    let fixture = Fixture::new(STOPS, &tracts);

    let options = AnalysisOptions {
        county: Some("king".to_string()),
        hour: Some(8),
        ..AnalysisOptions::default()
    };
    let analysis = fixture.run(&options);

    assert_eq!(analysis.table.len(), 2);
    assert_eq!(analysis.report.tracts.out_of_scope, 1);
    assert_eq!(analysis.report.stops.outside_hour, 3);
    let row = analysis.table.get(&TractId::from("53033000100")).unwrap();
    assert_eq!(row.stops, 2);
    assert_eq!(row.value(Column::StopsPct(RaceCategory::Black)), Some(100.0));
}

#[test]
fn cached_run_survives_reopen() {
    let fixture = Fixture::new(STOPS, &two_tracts());
    let db = fixture.path("cache/tractstops.db");
    let options = AnalysisOptions::default();

    let fresh = {
        let storage = Storage::open(&db).unwrap();
        Analysis::run_cached(&fixture.inputs(), &options, Some(&storage)).unwrap()
    };
    assert!(!fresh.from_cache);

    let storage = Storage::open(&db).unwrap();
    let cached = Analysis::run_cached(&fixture.inputs(), &options, Some(&storage)).unwrap();
    assert!(cached.from_cache);
    assert_eq!(cached.digest, fresh.digest);
    assert_eq!(cached.table, fresh.table);

    let inner = AnalysisOptions {
        policy: JoinPolicy::Inner,
        ..AnalysisOptions::default()
    };
    let other = Analysis::run_cached(&fixture.inputs(), &inner, Some(&storage)).unwrap();
    assert!(!other.from_cache);
    assert_eq!(storage.stats().unwrap().cached_tables, 2);
}

#[test]
fn import_matches_in_memory_join() {
    let fixture = Fixture::new(STOPS, &two_tracts());
    let options = AnalysisOptions::default();
    let inputs = fixture.inputs();
    let dataset = Dataset::load(&inputs, &options).unwrap();
    let join = dataset.spatial_join();

    let mut storage = Storage::open(fixture.path("import.db")).unwrap();
    let summary = storage
        .import(
            &dataset.stops.records,
            &dataset.tracts.tracts,
            &join,
            inputs.digest(&options).as_str(),
        )
        .unwrap();
    assert_eq!(summary.stops, 5);
    assert_eq!(summary.tracts, 2);
    assert_eq!(summary.assignments, 3);

    assert_eq!(storage.stop_counts().unwrap(), join.stops_per_tract());

    let stored = storage.tracts().unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].id, dataset.tracts.tracts[0].id);
    assert_eq!(stored[0].demographics, dataset.tracts.tracts[0].demographics);
}

#[test]
fn csv_and_json_outputs_agree_on_rows() {
    let fixture = Fixture::new(STOPS, &two_tracts());
    let table = fixture.run(&AnalysisOptions::default()).table;

    let mut csv_out = Vec::new();
    table.write_csv(&mut csv_out).unwrap();
    let csv_text = String::from_utf8(csv_out).unwrap();
    assert_eq!(csv_text.lines().count(), 3);
    assert!(csv_text.starts_with("TractID,County,Stops,"));

    let mut json_out = Vec::new();
    table.write_json(&mut json_out).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&json_out).unwrap();
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["TractID"], "53033000100");
    assert_eq!(rows[0]["Stops"], 3);
    assert!(rows[1]["StopsPctBlack"].is_null());
}

#[test]
fn missing_geometry_column_is_an_error() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("stops.csv"), "stop_id,subject_race\n1,black\n").unwrap();
    fs::write(dir.path().join("tracts.csv"), format!("{TRACT_HEADER}\n")).unwrap();

    let inputs = Inputs::read(dir.path().join("stops.csv"), dir.path().join("tracts.csv")).unwrap();
    let err = Analysis::run(&inputs, &AnalysisOptions::default()).unwrap_err();
    assert!(matches!(err, Error::MissingColumn { column: "geometry", .. }));
}
