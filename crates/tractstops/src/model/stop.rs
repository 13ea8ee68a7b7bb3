//! Traffic stop records.

use chrono::{NaiveDateTime, Timelike};
use geo::Point;

use super::category::{Activity, Race, Sex};

/// A single traffic stop subject.
///
/// Multi-subject stops produce one record per subject, so several records
/// may share a timestamp and location. Records are immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct StopRecord {
    /// Synthetic stop identifier.
    pub id: String,
    /// Local date and time of the stop.
    pub timestamp: Option<NaiveDateTime>,
    /// WGS84 location (x = longitude, y = latitude). `None` when the
    /// coordinate was missing or malformed.
    pub location: Option<Point<f64>>,
    /// Subject age in years.
    pub age: Option<u32>,
    /// Subject race.
    pub race: Option<Race>,
    /// Subject sex.
    pub sex: Option<Sex>,
    /// Whether a search was conducted.
    pub search_conducted: Option<bool>,
    /// Whether a frisk was performed.
    pub frisk_performed: Option<bool>,
    /// Whether contraband was found.
    pub contraband_found: Option<bool>,
    /// Whether a citation was issued.
    pub citation_issued: Option<bool>,
    /// Whether a warning was issued.
    pub warning_issued: Option<bool>,
    /// Recorded outcome (`citation`, `warning`, `arrest`, ...).
    pub outcome: Option<String>,
}

impl StopRecord {
    /// Create a record with only an identifier set.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: None,
            location: None,
            age: None,
            race: None,
            sex: None,
            search_conducted: None,
            frisk_performed: None,
            contraband_found: None,
            citation_issued: None,
            warning_issued: None,
            outcome: None,
        }
    }

    /// Set the location from a longitude/latitude pair.
    #[must_use]
    pub fn at(mut self, lon: f64, lat: f64) -> Self {
        self.location = Some(Point::new(lon, lat));
        self
    }

    /// Set the subject race.
    #[must_use]
    pub fn with_race(mut self, race: Race) -> Self {
        self.race = Some(race);
        self
    }

    /// Set the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: NaiveDateTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Mark an activity as having occurred.
    #[must_use]
    pub fn with_activity(mut self, activity: Activity) -> Self {
        *self.flag_mut(activity) = Some(true);
        self
    }

    /// Whether the given activity occurred. An absent flag counts as no.
    #[must_use]
    pub fn flag(&self, activity: Activity) -> bool {
        let value = match activity {
            Activity::Searched => self.search_conducted,
            Activity::Frisked => self.frisk_performed,
            Activity::ContrabandFound => self.contraband_found,
            Activity::Citation => self.citation_issued,
            Activity::Warning => self.warning_issued,
        };
        value.unwrap_or(false)
    }

    pub(crate) fn flag_mut(&mut self, activity: Activity) -> &mut Option<bool> {
        match activity {
            Activity::Searched => &mut self.search_conducted,
            Activity::Frisked => &mut self.frisk_performed,
            Activity::ContrabandFound => &mut self.contraband_found,
            Activity::Citation => &mut self.citation_issued,
            Activity::Warning => &mut self.warning_issued,
        }
    }

    /// Hour of day (0-23) of the stop, if the timestamp is known.
    #[must_use]
    pub fn hour(&self) -> Option<u32> {
        self.timestamp.map(|ts| ts.hour())
    }
}
