//! Descriptive statistics over table columns and stop times.

use serde::{Deserialize, Serialize};

use crate::model::StopRecord;

/// Column summary with the same fields as a pandas `describe()`.
///
/// Missing and non-finite values are skipped; `count` is the number of
/// values that remain. Every statistic is `None` when `count` is zero, and
/// `std` is also `None` for a single value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Values summarized.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: Option<f64>,
    /// Sample standard deviation (n - 1 denominator).
    pub std: Option<f64>,
    /// Smallest value.
    pub min: Option<f64>,
    /// 25th percentile.
    pub q25: Option<f64>,
    /// 50th percentile.
    pub median: Option<f64>,
    /// 75th percentile.
    pub q75: Option<f64>,
    /// Largest value.
    pub max: Option<f64>,
}

impl Summary {
    /// Summarize a column.
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn of(values: &[Option<f64>]) -> Self {
        let mut sorted: Vec<f64> = values
            .iter()
            .flatten()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        if sorted.is_empty() {
            return Self::default();
        }
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let n = count as f64;
        let mean = sorted.iter().sum::<f64>() / n;
        let std = (count > 1).then(|| {
            let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1.0)).sqrt()
        });

        Self {
            count,
            mean: Some(mean),
            std,
            min: sorted.first().copied(),
            q25: quantile_sorted(&sorted, 0.25),
            median: quantile_sorted(&sorted, 0.5),
            q75: quantile_sorted(&sorted, 0.75),
            max: sorted.last().copied(),
        }
    }
}

/// Linear-interpolated quantile of ascending `sorted` values.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
#[must_use]
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let pos = q.clamp(0.0, 1.0) * last as f64;
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(last);
    let frac = pos - lo as f64;
    Some(sorted[lo] * (1.0 - frac) + sorted[hi] * frac)
}

/// Stops per hour of day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourHistogram {
    /// Stop count for hours 0 through 23.
    pub counts: [usize; 24],
    /// Stops without a usable timestamp.
    pub unknown: usize,
}

impl HourHistogram {
    /// Count stops by hour.
    #[must_use]
    pub fn of<'a>(stops: impl IntoIterator<Item = &'a StopRecord>) -> Self {
        let mut histogram = Self::default();
        for stop in stops {
            match stop.hour() {
                Some(hour) => histogram.counts[hour as usize] += 1,
                None => histogram.unknown += 1,
            }
        }
        histogram
    }

    /// Stops with a known hour.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    /// The busiest hour; the earliest wins a tie. `None` when no hour is known.
    #[must_use]
    pub fn peak(&self) -> Option<u32> {
        let (hour, count) = self
            .counts
            .iter()
            .enumerate()
            .rev()
            .max_by_key(|(_, count)| **count)?;
        (*count > 0).then(|| u32::try_from(hour).unwrap_or_default())
    }

    /// Iterate `(hour, count)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (u32, usize)> + '_ {
        (0u32..).zip(self.counts.iter().copied())
    }
}
