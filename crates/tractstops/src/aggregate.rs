//! Per-tract stop counts and percentages by race and activity.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::{Activity, Race, RaceCategory, StopRecord, TractId};
use crate::spatial::SpatialJoin;

/// `count / total * 100`, or `None` when `total` is zero.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn percentage(count: usize, total: usize) -> Option<f64> {
    (total > 0).then(|| count as f64 / total as f64 * 100.0)
}

/// A count and its share of the relevant denominator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoryShare {
    /// Stops in the category.
    pub count: usize,
    /// Percent of the denominator; `None` when the denominator is zero.
    pub pct: Option<f64>,
}

/// Stop counts for one tract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TractStops {
    /// All stops assigned to the tract.
    pub total: usize,
    /// Stops whose subject race is known.
    pub known_race: usize,
    /// Stops per [`Race`], indexed by [`Race::index`].
    pub by_race: [usize; 5],
    /// Stops where each [`Activity`] occurred, indexed by [`Activity::index`].
    pub by_activity: [usize; 5],
}

impl TractStops {
    /// Count one stop.
    pub fn add(&mut self, stop: &StopRecord) {
        self.total += 1;
        if let Some(race) = stop.race {
            self.known_race += 1;
            self.by_race[race.index()] += 1;
        }
        for activity in Activity::ALL {
            if stop.flag(activity) {
                self.by_activity[activity.index()] += 1;
            }
        }
    }

    /// Stops whose subject falls in the race category.
    #[must_use]
    pub fn race_count(&self, category: RaceCategory) -> usize {
        Race::ALL
            .into_iter()
            .filter(|race| category.includes(*race))
            .map(|race| self.by_race[race.index()])
            .sum()
    }

    /// Stops where the activity occurred.
    #[must_use]
    pub fn activity_count(&self, activity: Activity) -> usize {
        self.by_activity[activity.index()]
    }

    /// Race category count and its percent of stops with a known race.
    #[must_use]
    pub fn race_share(&self, category: RaceCategory) -> CategoryShare {
        let count = self.race_count(category);
        CategoryShare {
            count,
            pct: percentage(count, self.known_race),
        }
    }

    /// Activity count and its percent of all stops.
    #[must_use]
    pub fn activity_share(&self, activity: Activity) -> CategoryShare {
        let count = self.activity_count(activity);
        CategoryShare {
            count,
            pct: percentage(count, self.total),
        }
    }
}

/// Stop counts for every tract that received at least one stop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopAggregate {
    tracts: BTreeMap<TractId, TractStops>,
}

impl StopAggregate {
    /// Aggregate `(tract, stop)` pairs. The result does not depend on pair order.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a TractId, &'a StopRecord)>) -> Self {
        let mut tracts: BTreeMap<TractId, TractStops> = BTreeMap::new();
        for (id, stop) in pairs {
            tracts.entry(id.clone()).or_default().add(stop);
        }
        let aggregate = Self { tracts };
        debug!(
            tracts = aggregate.len(),
            stops = aggregate.total_stops(),
            "Aggregated stops by tract"
        );
        aggregate
    }

    /// Aggregate the assigned stops of a spatial join. Unassigned and invalid
    /// stops are skipped.
    #[must_use]
    pub fn from_join(stops: &[StopRecord], join: &SpatialJoin) -> Self {
        Self::from_pairs(join.assigned(stops))
    }

    /// Counts for one tract.
    #[must_use]
    pub fn get(&self, id: &TractId) -> Option<&TractStops> {
        self.tracts.get(id)
    }

    /// Iterate tracts in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (&TractId, &TractStops)> {
        self.tracts.iter()
    }

    /// Number of tracts with stops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracts.len()
    }

    /// Whether no tract has stops.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracts.is_empty()
    }

    /// Stops across all tracts.
    #[must_use]
    pub fn total_stops(&self) -> usize {
        self.tracts.values().map(|t| t.total).sum()
    }
}
