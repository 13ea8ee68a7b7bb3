//! Core record types: traffic stops, census tracts and their categories.

mod category;
mod stop;
mod tract;

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use category::{Activity, Race, RaceCategory, RaceLabel, Sex};
pub use stop::StopRecord;
pub use tract::{CensusTract, Demographics};

/// A census tract identifier (the 11-digit GEOID for U.S. tracts).
///
/// Identifiers coming out of spreadsheets are often rendered as floats
/// (`53033000100.0`); [`TractId::parse`] reduces those to their digits so
/// the same tract always compares equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TractId(String);

fn float_rendered_id() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)\.0*$").expect("valid tract id pattern"))
}

impl TractId {
    /// Parse and normalize a raw identifier.
    ///
    /// Returns `None` for blank input.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        let normalized = float_rendered_id()
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
            .map_or(trimmed, |m| m.as_str());
        Some(Self(normalized.to_string()))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TractId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TractId {
    fn from(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|| Self(String::new()))
    }
}
