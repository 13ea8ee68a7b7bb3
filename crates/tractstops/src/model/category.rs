//! Categorical fields of stop records and the reported race categories.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Race of a stop subject. The five values are mutually exclusive.
///
/// `Other` conflates several census categories (two or more races, Native
/// American). That is a property of the source data and is kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Race {
    /// White, non-Hispanic.
    White,
    /// Black.
    Black,
    /// Hispanic or Latino.
    Hispanic,
    /// Asian or Pacific Islander.
    #[serde(rename = "AAPI")]
    Aapi,
    /// Any other race.
    Other,
}

/// Outcome of reading a raw race label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceLabel {
    /// The label names a known race.
    Known(Race),
    /// The label explicitly records an unknown race (`unknown`, `NA`, blank).
    Unknown,
    /// The label is not one the loader recognizes.
    Unrecognized,
}

impl Race {
    /// All races in column order.
    pub const ALL: [Self; 5] = [
        Self::White,
        Self::Black,
        Self::Hispanic,
        Self::Aapi,
        Self::Other,
    ];

    /// Position of this race in [`Race::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short label used in column names.
    #[must_use]
    pub fn label(self) -> &'static str {
        RaceCategory::from(self).label()
    }

    /// Classify a raw label from the stop dataset.
    #[must_use]
    pub fn classify(raw: &str) -> RaceLabel {
        let label = raw.trim().to_ascii_lowercase();
        match label.as_str() {
            "" | "na" | "nan" | "null" | "none" | "unknown" => RaceLabel::Unknown,
            "white" => RaceLabel::Known(Self::White),
            "black" | "african american" => RaceLabel::Known(Self::Black),
            "hispanic" | "latino" | "hispanic/latino" => RaceLabel::Known(Self::Hispanic),
            "asian/pacific islander" | "asian" | "pacific islander" | "aapi" => {
                RaceLabel::Known(Self::Aapi)
            }
            "other" | "native american" | "american indian" | "two or more races"
            | "multiracial" => RaceLabel::Known(Self::Other),
            _ => RaceLabel::Unrecognized,
        }
    }
}

/// The six race categories reported per tract.
///
/// Five mirror [`Race`]; `Bipoc` aggregates every race except White.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RaceCategory {
    /// White.
    White,
    /// Black.
    Black,
    /// Hispanic.
    Hispanic,
    /// Asian or Pacific Islander.
    #[serde(rename = "AAPI")]
    Aapi,
    /// Other.
    Other,
    /// Black, Indigenous and People of Color.
    #[serde(rename = "BIPOC")]
    Bipoc,
}

impl RaceCategory {
    /// All categories in column order.
    pub const ALL: [Self; 6] = [
        Self::White,
        Self::Black,
        Self::Hispanic,
        Self::Aapi,
        Self::Other,
        Self::Bipoc,
    ];

    /// Position of this category in [`RaceCategory::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Label used in column names (`StopsPct<label>`).
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::White => "White",
            Self::Black => "Black",
            Self::Hispanic => "Hispanic",
            Self::Aapi => "AAPI",
            Self::Other => "Other",
            Self::Bipoc => "BIPOC",
        }
    }

    /// Whether a subject of the given race counts toward this category.
    #[must_use]
    pub fn includes(self, race: Race) -> bool {
        match self {
            Self::Bipoc => race != Race::White,
            _ => Self::from(race) == self,
        }
    }
}

impl From<Race> for RaceCategory {
    fn from(race: Race) -> Self {
        match race {
            Race::White => Self::White,
            Race::Black => Self::Black,
            Race::Hispanic => Self::Hispanic,
            Race::Aapi => Self::Aapi,
            Race::Other => Self::Other,
        }
    }
}

impl std::fmt::Display for RaceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RaceCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::unknown_category("race", s))
    }
}

/// An activity that may occur during a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Activity {
    /// A search was conducted.
    Searched,
    /// A frisk was performed.
    Frisked,
    /// Contraband was found.
    ContrabandFound,
    /// A citation was issued.
    Citation,
    /// A warning was issued.
    Warning,
}

impl Activity {
    /// All activities in column order.
    pub const ALL: [Self; 5] = [
        Self::Searched,
        Self::Frisked,
        Self::ContrabandFound,
        Self::Citation,
        Self::Warning,
    ];

    /// Position of this activity in [`Activity::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Label used in column names (`StopsPct<label>`).
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Searched => "Searched",
            Self::Frisked => "Frisked",
            Self::ContrabandFound => "ContrabandFound",
            Self::Citation => "Citation",
            Self::Warning => "Warning",
        }
    }

    /// Name of the boolean column in the stop dataset.
    #[must_use]
    pub fn source_column(self) -> &'static str {
        match self {
            Self::Searched => "search_conducted",
            Self::Frisked => "frisk_performed",
            Self::ContrabandFound => "contraband_found",
            Self::Citation => "citation_issued",
            Self::Warning => "warning_issued",
        }
    }
}

impl std::fmt::Display for Activity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Activity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.label().eq_ignore_ascii_case(s) || a.source_column().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::unknown_category("activity", s))
    }
}

/// Sex of a stop subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    /// Male.
    Male,
    /// Female.
    Female,
}

impl Sex {
    /// Parse a raw label; anything other than male/female is absent.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "male" | "m" => Some(Self::Male),
            "female" | "f" => Some(Self::Female),
            _ => None,
        }
    }

    /// Lowercase label, as in the source data.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }
}
