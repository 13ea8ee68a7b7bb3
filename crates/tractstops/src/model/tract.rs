//! Census tracts and their demographics.

use geo::MultiPolygon;
use serde::{Deserialize, Serialize};

use super::category::RaceCategory;
use super::TractId;

/// Demographic attributes of a census tract (ACS 5-year estimates).
///
/// Every field is optional: the survey suppresses values for tracts with
/// tiny or zero population.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    /// Total population.
    pub population: Option<f64>,
    /// Percent of population per race category, indexed by
    /// [`RaceCategory::index`].
    pub pct_race: [Option<f64>; 6],
    /// Median age in years.
    pub median_age: Option<f64>,
    /// Median household income in dollars per year.
    pub median_income: Option<f64>,
    /// Percent male.
    pub pct_male: Option<f64>,
    /// Percent holding a bachelor's degree or higher.
    pub pct_college_educated: Option<f64>,
    /// Percent below the poverty line.
    pub pct_below_poverty: Option<f64>,
}

impl Demographics {
    /// Percent of population in the given race category.
    #[must_use]
    pub fn pct(&self, category: RaceCategory) -> Option<f64> {
        self.pct_race[category.index()]
    }
}

/// A census tract: identifier, demographics and boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct CensusTract {
    /// Unique tract identifier.
    pub id: TractId,
    /// County name, when the dataset carries one.
    pub county: Option<String>,
    /// Demographic attributes.
    pub demographics: Demographics,
    /// Tract boundary in WGS84 longitude/latitude.
    pub boundary: MultiPolygon<f64>,
}

impl CensusTract {
    /// Create a tract with empty demographics.
    #[must_use]
    pub fn new(id: TractId, boundary: MultiPolygon<f64>) -> Self {
        Self {
            id,
            county: None,
            demographics: Demographics::default(),
            boundary,
        }
    }
}
