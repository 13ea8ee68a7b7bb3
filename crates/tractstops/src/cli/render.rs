//! Plain-text rendering for terminal output.

use std::io::{self, Write};

use serde_json::{json, Value};

use crate::disparity::{Column, DisparityRow, COUNTY, TRACT_ID};
use crate::error::Result;
use crate::model::RaceCategory;
use crate::pipeline::PipelineReport;
use crate::regression::LinearFit;
use crate::stats::{HourHistogram, Summary};

const MIN_WIDTH: usize = 8;
const BAR_WIDTH: usize = 40;

/// Format a value with two decimals; missing values render as `-`.
#[must_use]
pub fn value(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}

/// Columns shown by the aligned row view.
#[must_use]
pub fn row_columns() -> Vec<Column> {
    let mut columns = vec![Column::Stops];
    columns.extend(RaceCategory::ALL.map(Column::StopsPct));
    columns.extend(RaceCategory::ALL.map(Column::TractPct));
    columns
}

/// Write rows as aligned text.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_rows<W: Write>(mut w: W, rows: &[DisparityRow], columns: &[Column]) -> io::Result<()> {
    let id_width = rows
        .iter()
        .map(|r| r.tract_id.as_str().len())
        .chain([TRACT_ID.len()])
        .max()
        .unwrap_or(MIN_WIDTH);
    let county_width = rows
        .iter()
        .filter_map(|r| r.county.as_deref().map(str::len))
        .chain([COUNTY.len()])
        .max()
        .unwrap_or(MIN_WIDTH);
    let widths: Vec<usize> = columns
        .iter()
        .map(|c| c.name().len().max(MIN_WIDTH))
        .collect();

    write!(w, "{TRACT_ID:<id_width$}  {COUNTY:<county_width$}")?;
    for (column, width) in columns.iter().zip(widths.iter().copied()) {
        write!(w, "  {:>width$}", column.name())?;
    }
    writeln!(w)?;

    for row in rows {
        write!(
            w,
            "{:<id_width$}  {:<county_width$}",
            row.tract_id.as_str(),
            row.county.as_deref().unwrap_or("-")
        )?;
        for (column, width) in columns.iter().zip(widths.iter().copied()) {
            let cell = match column {
                Column::Stops => row.stops.to_string(),
                _ => value(row.value(*column)),
            };
            write!(w, "  {cell:>width$}")?;
        }
        writeln!(w)?;
    }
    Ok(())
}

/// One line describing a fit, or why none exists.
///
/// `verdict` is appended after the equation when the fit succeeded.
#[must_use]
pub fn fit_line(label: &str, fit: &Result<LinearFit>, verdict: Option<String>) -> String {
    match fit {
        Ok(fit) => {
            let r2 = fit
                .r_squared
                .map_or_else(|| "n/a".to_string(), |r| format!("{r:.3}"));
            let mut line = format!(
                "{label}: {fit}  (R² {r2}, n = {}, {} excluded)",
                fit.n, fit.excluded
            );
            if let Some(verdict) = verdict {
                line.push(' ');
                line.push_str(&verdict);
            }
            line
        }
        Err(e) => format!("{label}: no fit ({e})"),
    }
}

/// JSON object describing a fit; failures carry an `error` message instead.
#[must_use]
pub fn fit_json(x: Column, y: Column, fit: &Result<LinearFit>) -> Value {
    match fit {
        Ok(fit) => json!({ "x": x, "y": y, "fit": fit }),
        Err(e) => json!({ "x": x, "y": y, "fit": null, "error": e.to_string() }),
    }
}

/// Write column summaries as aligned text.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_describe<W: Write>(mut w: W, summaries: &[(Column, Summary)]) -> io::Result<()> {
    let name_width = summaries
        .iter()
        .map(|(c, _)| c.name().len())
        .max()
        .unwrap_or(MIN_WIDTH);
    writeln!(
        w,
        "{:<name_width$}  {:>6}  {:>10}  {:>10}  {:>10}  {:>10}  {:>10}  {:>10}  {:>10}",
        "column", "count", "mean", "std", "min", "25%", "50%", "75%", "max"
    )?;
    for (column, s) in summaries {
        writeln!(
            w,
            "{:<name_width$}  {:>6}  {:>10}  {:>10}  {:>10}  {:>10}  {:>10}  {:>10}  {:>10}",
            column.name(),
            s.count,
            value(s.mean),
            value(s.std),
            value(s.min),
            value(s.q25),
            value(s.median),
            value(s.q75),
            value(s.max),
        )?;
    }
    Ok(())
}

/// Write an hour-of-day histogram with proportional bars.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_hours<W: Write>(mut w: W, hours: &HourHistogram) -> io::Result<()> {
    let max = hours.counts.iter().copied().max().unwrap_or(0);
    for (hour, count) in hours.iter() {
        let bar = if max == 0 { 0 } else { count * BAR_WIDTH / max };
        writeln!(w, "{hour:02}:00  {count:>8}  {}", "#".repeat(bar))?;
    }
    if hours.unknown > 0 {
        writeln!(w, "unknown  {:>7}", hours.unknown)?;
    }
    if let Some(peak) = hours.peak() {
        writeln!(w, "peak hour: {peak:02}:00")?;
    }
    Ok(())
}

/// Human-readable lines for every non-zero exclusion count of a run.
#[must_use]
pub fn exclusions(report: &PipelineReport) -> Vec<String> {
    let counts = [
        (report.stops.malformed_rows, "malformed stop rows skipped"),
        (report.stops.bad_timestamps, "stops with unparseable timestamps"),
        (report.stops.unrecognized_races, "stops with unrecognized race labels"),
        (report.stops.outside_hour, "stops outside the selected hour"),
        (report.tracts.malformed_rows, "malformed tract rows skipped"),
        (report.tracts.missing_ids, "tract rows without an id"),
        (report.tracts.invalid_geometries, "tracts with invalid boundaries"),
        (report.tracts.duplicate_ids, "duplicate tract ids ignored"),
        (report.tracts.out_of_scope, "tracts outside the selected county"),
        (report.join.invalid_coordinates, "stops without a valid coordinate"),
        (report.join.unassigned, "stops outside every tract"),
        (report.join.ambiguous, "stops inside more than one tract"),
        (report.disparity.unmatched_stops, "stops in tracts without demographics"),
    ];
    counts
        .into_iter()
        .filter(|(count, _)| *count > 0)
        .map(|(count, what)| format!("{count} {what}"))
        .collect()
}

/// Write one `excluded: ...` line per non-zero exclusion count.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_exclusions<W: Write>(mut w: W, report: &PipelineReport) -> io::Result<()> {
    for line in exclusions(report) {
        writeln!(w, "excluded: {line}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::model::{CensusTract, TractId};

    fn row(id: &str, stops: usize) -> DisparityRow {
        let tract = CensusTract::new(TractId::from(id), geo::MultiPolygon::new(vec![]));
        DisparityRow {
            tract_id: tract.id,
            county: Some("King".to_string()),
            stops,
            stops_pct_race: [Some(50.0), Some(50.0), None, None, None, Some(50.0)],
            stops_pct_activity: [None; 5],
            demographics: tract.demographics,
        }
    }

    #[test]
    fn test_value_formatting() {
        assert_eq!(value(Some(66.666_666)), "66.67");
        assert_eq!(value(None), "-");
    }

    #[test]
    fn test_write_rows_aligned() {
        let mut out = Vec::new();
        let rows = [row("53033000100", 2), row("53033000200", 0)];
        write_rows(&mut out, &rows, &row_columns()).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("TractID"));
        assert!(lines[0].contains("StopsPctBIPOC"));
        assert!(lines[1].contains("50.00"));
        assert_eq!(lines[0].len(), lines[1].len());
    }

    #[test]
    fn test_fit_line_variants() {
        let fit = LinearFit {
            slope: 1.5,
            intercept: 0.25,
            r_squared: Some(0.9),
            n: 10,
            excluded: 2,
        };
        let line = fit_line("Black", &Ok(fit), Some("over".to_string()));
        assert!(line.starts_with("Black: y = 1.50000x + 0.25000"));
        assert!(line.contains("n = 10"));
        assert!(line.ends_with("over"));

        let err = Err(Error::InsufficientData { needed: 2, found: 1 });
        assert!(fit_line("White", &err, None).contains("no fit"));
    }

    #[test]
    fn test_fit_json_error_shape() {
        let err = Err(Error::InsufficientData { needed: 2, found: 0 });
        let value = fit_json(Column::Stops, Column::TractMedianAge, &err);
        assert_eq!(value["x"], "Stops");
        assert!(value["fit"].is_null());
        assert!(value["error"].is_string());
    }

    #[test]
    fn test_write_hours_scales_bars() {
        let mut hours = HourHistogram::default();
        hours.counts[8] = 10;
        hours.counts[9] = 5;
        hours.unknown = 1;

        let mut out = Vec::new();
        write_hours(&mut out, &hours).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(&format!("08:00  {:>8}  {}", 10, "#".repeat(BAR_WIDTH))));
        assert!(text.contains(&"#".repeat(BAR_WIDTH / 2)));
        assert!(text.contains("unknown"));
        assert!(text.contains("peak hour: 08:00"));
    }

    #[test]
    fn test_exclusions_skip_zero_counts() {
        let mut report = PipelineReport::default();
        assert!(exclusions(&report).is_empty());

        report.join.invalid_coordinates = 3;
        report.join.unassigned = 1;
        let lines = exclusions(&report);
        assert_eq!(
            lines,
            vec![
                "3 stops without a valid coordinate".to_string(),
                "1 stops outside every tract".to_string(),
            ]
        );
    }

    #[test]
    fn test_write_exclusions_one_line_per_count() {
        let mut report = PipelineReport::default();
        let mut out = Vec::new();
        write_exclusions(&mut out, &report).unwrap();
        assert!(out.is_empty());

        report.stops.malformed_rows = 2;
        report.disparity.unmatched_stops = 5;
        write_exclusions(&mut out, &report).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "excluded: 2 malformed stop rows skipped\n\
             excluded: 5 stops in tracts without demographics\n"
        );
    }
}
