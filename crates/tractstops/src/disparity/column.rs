//! Numeric columns of the tract aggregate table.

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;
use crate::model::{Activity, RaceCategory};

use RaceCategory as R;

/// Name of the leading text column holding the tract id.
pub const TRACT_ID: &str = "TractID";
/// Name of the text column holding the county.
pub const COUNTY: &str = "County";

/// A numeric column of the tract aggregate table.
///
/// [`Column::ALL`] fixes the output order. Names are the ones the
/// visualization layer expects (`StopsPctBlack`, `TractPctMale`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    /// Stops assigned to the tract.
    Stops,
    /// Percent of tract population below the poverty line.
    TractPctBelowPoverty,
    /// Percent of the tract's stops (known race) in a race category.
    StopsPct(RaceCategory),
    /// Percent of the tract's stops where an activity occurred.
    StopsPctActivity(Activity),
    /// Percent of tract population in a race category.
    TractPct(RaceCategory),
    /// Percent of tract population that is male.
    TractPctMale,
    /// Tract population.
    TractPopulation,
    /// Median age.
    TractMedianAge,
    /// Median household income.
    TractMedianIncome,
    /// Percent holding a bachelor's degree or higher.
    TractPctCollegeEducated,
}

impl Column {
    /// Every numeric column in output order.
    pub const ALL: [Self; 24] = [
        Self::Stops,
        Self::TractPctBelowPoverty,
        Self::StopsPct(R::White),
        Self::StopsPct(R::Black),
        Self::StopsPct(R::Hispanic),
        Self::StopsPct(R::Aapi),
        Self::StopsPct(R::Other),
        Self::StopsPct(R::Bipoc),
        Self::StopsPctActivity(Activity::Searched),
        Self::StopsPctActivity(Activity::Frisked),
        Self::StopsPctActivity(Activity::ContrabandFound),
        Self::StopsPctActivity(Activity::Citation),
        Self::StopsPctActivity(Activity::Warning),
        Self::TractPct(R::White),
        Self::TractPct(R::Black),
        Self::TractPct(R::Hispanic),
        Self::TractPct(R::Aapi),
        Self::TractPct(R::Other),
        Self::TractPct(R::Bipoc),
        Self::TractPctMale,
        Self::TractPopulation,
        Self::TractMedianAge,
        Self::TractMedianIncome,
        Self::TractPctCollegeEducated,
    ];

    /// Column name.
    #[must_use]
    pub fn name(self) -> String {
        match self {
            Self::Stops => "Stops".to_string(),
            Self::TractPctBelowPoverty => "TractPctBelowPoverty".to_string(),
            Self::StopsPct(category) => format!("StopsPct{}", category.label()),
            Self::StopsPctActivity(activity) => format!("StopsPct{}", activity.label()),
            Self::TractPct(category) => format!("TractPct{}", category.label()),
            Self::TractPctMale => "TractPctMale".to_string(),
            Self::TractPopulation => "TractPopulation".to_string(),
            Self::TractMedianAge => "TractMedianAge".to_string(),
            Self::TractMedianIncome => "TractMedianIncome".to_string(),
            Self::TractPctCollegeEducated => "TractPctCollegeEducated".to_string(),
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Column {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnknownColumn(wanted.to_string()))
    }
}

impl Serialize for Column {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for Column {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
