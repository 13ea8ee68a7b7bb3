//! Ordinary least squares trendlines.
//!
//! The fit uses the centered closed form
//! `slope = Σ(x - x̄)(y - ȳ) / Σ(x - x̄)²`, `intercept = ȳ - slope·x̄`.
//! When `y == x` the numerator and denominator are computed by identical
//! operations, so the slope is exactly 1 and the intercept exactly 0.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fewest usable points a fit needs.
pub const MIN_POINTS: usize = 2;

/// A fitted line `y = slope·x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    /// Slope.
    pub slope: f64,
    /// Intercept.
    pub intercept: f64,
    /// Coefficient of determination; `None` when every y is the same.
    pub r_squared: Option<f64>,
    /// Points used.
    pub n: usize,
    /// Points dropped for a missing or non-finite value on either axis.
    pub excluded: usize,
}

impl LinearFit {
    /// Read a stop-share vs population-share slope against 1.
    #[must_use]
    pub fn proportionality(&self, tolerance: f64) -> Proportionality {
        if self.slope < 1.0 - tolerance {
            Proportionality::Under
        } else if self.slope > 1.0 + tolerance {
            Proportionality::Over
        } else {
            Proportionality::Proportional
        }
    }

    /// Read an activity slope against 0, treating `|slope| <= band` as weak.
    #[must_use]
    pub fn activity_trend(&self, band: f64) -> ActivityTrend {
        let slope = self.slope;
        if slope < -band {
            ActivityTrend::Decreasing
        } else if slope > band {
            ActivityTrend::Increasing
        } else if slope > 0.0 {
            ActivityTrend::WeakPositive
        } else if slope < 0.0 {
            ActivityTrend::WeakNegative
        } else {
            ActivityTrend::None
        }
    }
}

impl std::fmt::Display for LinearFit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "y = {:.5}x + {:.5}", self.slope, self.intercept)
    }
}

/// How a race's share of stops tracks its share of population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Proportionality {
    /// Slope below 1: stopped less than population share suggests.
    Under,
    /// Slope at 1 within tolerance.
    Proportional,
    /// Slope above 1: stopped more than population share suggests.
    Over,
}

impl std::fmt::Display for Proportionality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Under => "under-represented in stops",
            Self::Proportional => "proportional",
            Self::Over => "over-represented in stops",
        })
    }
}

/// How an activity rate moves with a race's population share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityTrend {
    /// Clearly falls.
    Decreasing,
    /// Falls, within the weak band.
    WeakNegative,
    /// Exactly flat.
    None,
    /// Rises, within the weak band.
    WeakPositive,
    /// Clearly rises.
    Increasing,
}

impl std::fmt::Display for ActivityTrend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Decreasing => "decreasing",
            Self::WeakNegative => "weak negative",
            Self::None => "no relationship",
            Self::WeakPositive => "weak positive",
            Self::Increasing => "increasing",
        })
    }
}

/// Fit `y` against `x` by ordinary least squares.
///
/// Pairs with a missing or non-finite value on either axis are excluded and
/// counted in [`LinearFit::excluded`].
///
/// # Errors
///
/// - [`Error::InsufficientData`] with fewer than two usable pairs.
/// - [`Error::DegenerateFit`] when every usable x is the same, or the x
///   spread is too small to give a finite line.
/// - [`Error::Internal`] when the slices differ in length.
#[allow(clippy::cast_precision_loss, clippy::float_cmp)]
pub fn fit_ols(x: &[Option<f64>], y: &[Option<f64>]) -> Result<LinearFit> {
    if x.len() != y.len() {
        return Err(Error::internal(format!(
            "fit axes differ in length ({} vs {})",
            x.len(),
            y.len()
        )));
    }

    let points: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter_map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((*x, *y)),
            _ => None,
        })
        .collect();
    let excluded = x.len() - points.len();

    if points.len() < MIN_POINTS {
        return Err(Error::InsufficientData {
            needed: MIN_POINTS,
            found: points.len(),
        });
    }

    let first_x = points[0].0;
    if points.iter().all(|(x, _)| *x == first_x) {
        return Err(Error::degenerate_fit(format!(
            "every x value equals {first_x}"
        )));
    }

    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in &points {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    if sxx == 0.0 {
        return Err(Error::degenerate_fit("x variance underflows to zero"));
    }
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    if !slope.is_finite() || !intercept.is_finite() {
        return Err(Error::degenerate_fit(format!(
            "line is not finite (sxx = {sxx:e})"
        )));
    }
    let r_squared = (syy > 0.0)
        .then(|| (sxy * sxy) / (sxx * syy))
        .filter(|r| r.is_finite());

    Ok(LinearFit {
        slope,
        intercept,
        r_squared,
        n: points.len(),
        excluded,
    })
}
