//! Disparity join: per-tract stop aggregates joined with tract demographics.
//!
//! The result is the tract aggregate table, one row per tract, consumed by
//! every scatter plot and trendline.
//!
//! Under [`JoinPolicy::Left`] every tract in the demographic table gets a
//! row. Tracts without stops keep `Stops = 0` and `None` in every
//! `StopsPct*` column. [`JoinPolicy::Inner`] drops those tracts instead.
//! Either way, stop aggregates for tract ids absent from the demographic
//! table are excluded and counted.

mod column;

use std::collections::BTreeMap;
use std::io::Write;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use tracing::{info, warn};

pub use column::{Column, COUNTY, TRACT_ID};

use crate::aggregate::{StopAggregate, TractStops};
use crate::error::Result;
use crate::model::{Activity, CensusTract, Demographics, RaceCategory, TractId};
use crate::regression::{fit_ols, LinearFit};
use crate::stats::Summary;

/// How tracts without stops are treated.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum JoinPolicy {
    /// Keep every tract; stop percentages are `None` where there are no stops.
    #[default]
    Left,
    /// Keep only tracts with at least one stop.
    Inner,
}

impl std::fmt::Display for JoinPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Left => "left",
            Self::Inner => "inner",
        })
    }
}

/// One row of the tract aggregate table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisparityRow {
    /// Tract identifier.
    pub tract_id: TractId,
    /// County name.
    pub county: Option<String>,
    /// Stops assigned to the tract.
    pub stops: usize,
    /// `StopsPct<Race>` indexed by [`RaceCategory::index`].
    pub stops_pct_race: [Option<f64>; 6],
    /// `StopsPct<Activity>` indexed by [`Activity::index`].
    pub stops_pct_activity: [Option<f64>; 5],
    /// The tract's own demographics.
    pub demographics: Demographics,
}

impl DisparityRow {
    fn new(tract: &CensusTract, stops: Option<&TractStops>) -> Self {
        let mut stops_pct_race = [None; 6];
        let mut stops_pct_activity = [None; 5];
        if let Some(counts) = stops {
            for category in RaceCategory::ALL {
                stops_pct_race[category.index()] = counts.race_share(category).pct;
            }
            for activity in Activity::ALL {
                stops_pct_activity[activity.index()] = counts.activity_share(activity).pct;
            }
        }
        Self {
            tract_id: tract.id.clone(),
            county: tract.county.clone(),
            stops: stops.map_or(0, |c| c.total),
            stops_pct_race,
            stops_pct_activity,
            demographics: tract.demographics.clone(),
        }
    }

    /// Value of a numeric column; `None` means no data.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn value(&self, column: Column) -> Option<f64> {
        let demo = &self.demographics;
        match column {
            Column::Stops => Some(self.stops as f64),
            Column::TractPctBelowPoverty => demo.pct_below_poverty,
            Column::StopsPct(category) => self.stops_pct_race[category.index()],
            Column::StopsPctActivity(activity) => self.stops_pct_activity[activity.index()],
            Column::TractPct(category) => demo.pct(category),
            Column::TractPctMale => demo.pct_male,
            Column::TractPopulation => demo.population,
            Column::TractMedianAge => demo.median_age,
            Column::TractMedianIncome => demo.median_income,
            Column::TractPctCollegeEducated => demo.pct_college_educated,
        }
    }

    fn cell(&self, column: Column) -> String {
        match column {
            Column::Stops => self.stops.to_string(),
            _ => self.value(column).map(|v| v.to_string()).unwrap_or_default(),
        }
    }
}

/// Counts from a disparity join.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisparityReport {
    /// Policy the table was built with.
    pub policy: JoinPolicy,
    /// Rows in the table.
    pub rows: usize,
    /// Rows (left join) or dropped tracts (inner join) without stops.
    pub tracts_without_stops: usize,
    /// Tract ids with stops but no demographic row.
    pub unmatched_tracts: usize,
    /// Stops in those unmatched tracts.
    pub unmatched_stops: usize,
}

/// The tract aggregate table, rows in ascending tract id order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisparityTable {
    rows: Vec<DisparityRow>,
    report: DisparityReport,
}

/// Join stop aggregates with tract demographics.
///
/// Repeated tract ids in `tracts` keep their first occurrence.
#[must_use]
pub fn disparity_join(
    aggregate: &StopAggregate,
    tracts: &[CensusTract],
    policy: JoinPolicy,
) -> DisparityTable {
    let mut by_id: BTreeMap<&TractId, &CensusTract> = BTreeMap::new();
    for tract in tracts {
        by_id.entry(&tract.id).or_insert(tract);
    }

    let mut report = DisparityReport {
        policy,
        ..DisparityReport::default()
    };

    for (id, counts) in aggregate.iter() {
        if !by_id.contains_key(id) {
            report.unmatched_tracts += 1;
            report.unmatched_stops += counts.total;
        }
    }
    if report.unmatched_tracts > 0 {
        warn!(
            tracts = report.unmatched_tracts,
            stops = report.unmatched_stops,
            "Stop tracts missing from demographic table"
        );
    }

    let mut rows = Vec::with_capacity(by_id.len());
    for (id, tract) in by_id {
        let stops = aggregate.get(id);
        if stops.is_none() {
            report.tracts_without_stops += 1;
            if policy == JoinPolicy::Inner {
                continue;
            }
        }
        rows.push(DisparityRow::new(tract, stops));
    }
    report.rows = rows.len();

    info!(
        %policy,
        rows = report.rows,
        without_stops = report.tracts_without_stops,
        "Built tract aggregate table"
    );
    DisparityTable { rows, report }
}

impl DisparityTable {
    /// All rows.
    #[must_use]
    pub fn rows(&self) -> &[DisparityRow] {
        &self.rows
    }

    /// Join counts.
    #[must_use]
    pub fn report(&self) -> &DisparityReport {
        &self.report
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The row for a tract.
    #[must_use]
    pub fn get(&self, id: &TractId) -> Option<&DisparityRow> {
        self.rows
            .binary_search_by(|row| row.tract_id.cmp(id))
            .ok()
            .map(|i| &self.rows[i])
    }

    /// The first `n` rows.
    #[must_use]
    pub fn head(&self, n: usize) -> &[DisparityRow] {
        &self.rows[..n.min(self.rows.len())]
    }

    /// A copy holding only the first `n` rows, with the same report.
    #[must_use]
    pub fn truncated(&self, n: usize) -> Self {
        Self {
            rows: self.head(n).to_vec(),
            report: self.report.clone(),
        }
    }

    /// Values of one column in row order.
    #[must_use]
    pub fn column(&self, column: Column) -> Vec<Option<f64>> {
        self.rows.iter().map(|row| row.value(column)).collect()
    }

    /// OLS trendline of `y` against `x` over tracts with values on both axes.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InsufficientData`] or
    /// [`crate::Error::DegenerateFit`] when no line can be fitted.
    pub fn fit(&self, x: Column, y: Column) -> Result<LinearFit> {
        fit_ols(&self.column(x), &self.column(y))
    }

    /// `StopsPct<stop_race>` against `TractPct<tract_race>`. With the same
    /// race on both axes the slope is the disparity indicator.
    ///
    /// # Errors
    ///
    /// See [`DisparityTable::fit`].
    pub fn race_fit(&self, tract_race: RaceCategory, stop_race: RaceCategory) -> Result<LinearFit> {
        self.fit(Column::TractPct(tract_race), Column::StopsPct(stop_race))
    }

    /// `StopsPct<activity>` against `TractPct<race>`.
    ///
    /// # Errors
    ///
    /// See [`DisparityTable::fit`].
    pub fn activity_fit(&self, race: RaceCategory, activity: Activity) -> Result<LinearFit> {
        self.fit(Column::TractPct(race), Column::StopsPctActivity(activity))
    }

    /// Same-race fits for every race category.
    #[must_use]
    pub fn race_fits(&self) -> Vec<(RaceCategory, Result<LinearFit>)> {
        RaceCategory::ALL
            .into_iter()
            .map(|race| (race, self.race_fit(race, race)))
            .collect()
    }

    /// Summary statistics of one column.
    #[must_use]
    pub fn summary(&self, column: Column) -> Summary {
        Summary::of(&self.column(column))
    }

    /// Summaries of every numeric column, in column order.
    #[must_use]
    pub fn describe(&self) -> Vec<(Column, Summary)> {
        Column::ALL
            .into_iter()
            .map(|column| (column, self.summary(column)))
            .collect()
    }

    /// Write the table as CSV. Missing values are empty cells.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);

        let mut header = vec![TRACT_ID.to_string(), COUNTY.to_string()];
        header.extend(Column::ALL.iter().map(|c| c.name()));
        wtr.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![
                row.tract_id.to_string(),
                row.county.clone().unwrap_or_default(),
            ];
            record.extend(Column::ALL.iter().map(|c| row.cell(*c)));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Write the rows as a JSON array of objects keyed by column name, in
    /// column order. Missing values are `null`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, &RowsView(&self.rows))?;
        Ok(())
    }
}

struct RowsView<'a>(&'a [DisparityRow]);

impl Serialize for RowsView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for row in self.0 {
            seq.serialize_element(&RowView(row))?;
        }
        seq.end()
    }
}

struct RowView<'a>(&'a DisparityRow);

impl Serialize for RowView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let row = self.0;
        let mut map = serializer.serialize_map(Some(Column::ALL.len() + 2))?;
        map.serialize_entry(TRACT_ID, &row.tract_id)?;
        map.serialize_entry(COUNTY, &row.county)?;
        for column in Column::ALL {
            match column {
                Column::Stops => map.serialize_entry(&column.name(), &row.stops)?,
                _ => map.serialize_entry(&column.name(), &row.value(column))?,
            }
        }
        map.end()
    }
}
