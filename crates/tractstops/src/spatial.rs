//! Spatial join: assign each stop to the tract containing its location.
//!
//! Tracts are enumerated in ascending [`TractId`] order and the first tract
//! whose closed boundary contains the point wins. A point on a boundary shared
//! by two tracts therefore always lands in the one with the smaller id, and
//! overlapping tracts resolve the same way. Such points are counted as
//! ambiguous so data errors stay visible.

use std::collections::BTreeMap;

use geo::{BoundingRect, Coord, Intersects, MultiPolygon, Rect};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::{CensusTract, StopRecord, TractId};

/// Where a single stop landed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", content = "tract", rename_all = "snake_case")]
pub enum Assignment {
    /// Contained by this tract.
    Tract(TractId),
    /// Valid coordinate outside every tract.
    Unassigned,
    /// Missing or malformed coordinate; excluded from the join.
    InvalidCoordinate,
}

impl Assignment {
    /// The assigned tract, if any.
    #[must_use]
    pub fn tract(&self) -> Option<&TractId> {
        match self {
            Self::Tract(id) => Some(id),
            Self::Unassigned | Self::InvalidCoordinate => None,
        }
    }
}

/// Counts from a spatial join.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinReport {
    /// Stops considered.
    pub stops: usize,
    /// Stops assigned to a tract.
    pub assigned: usize,
    /// Stops with a valid coordinate outside every tract.
    pub unassigned: usize,
    /// Stops excluded for a missing or malformed coordinate.
    pub invalid_coordinates: usize,
    /// Assigned stops that more than one tract contained.
    pub ambiguous: usize,
}

/// Result of a spatial join: one assignment per input stop, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpatialJoin {
    /// Assignment of `stops[i]` at index `i`.
    pub assignments: Vec<Assignment>,
    /// Join counts.
    pub report: JoinReport,
}

impl SpatialJoin {
    /// Iterate the stops that were assigned, paired with their tract.
    pub fn assigned<'a>(
        &'a self,
        stops: &'a [StopRecord],
    ) -> impl Iterator<Item = (&'a TractId, &'a StopRecord)> + 'a {
        self.assignments
            .iter()
            .zip(stops)
            .filter_map(|(assignment, stop)| assignment.tract().map(|id| (id, stop)))
    }

    /// Number of assigned stops per tract.
    #[must_use]
    pub fn stops_per_tract(&self) -> BTreeMap<TractId, usize> {
        let mut counts = BTreeMap::new();
        for id in self.assignments.iter().filter_map(Assignment::tract) {
            *counts.entry(id.clone()).or_insert(0) += 1;
        }
        counts
    }
}

#[derive(Debug, Clone)]
struct Entry {
    id: TractId,
    bbox: Rect<f64>,
    boundary: MultiPolygon<f64>,
}

/// Tract boundaries prepared for point lookups.
#[derive(Debug, Clone, Default)]
pub struct TractIndex {
    entries: Vec<Entry>,
}

impl TractIndex {
    /// Build an index. Empty boundaries are skipped; for repeated ids the
    /// first tract given is kept.
    pub fn new<'a>(tracts: impl IntoIterator<Item = &'a CensusTract>) -> Self {
        let mut entries: Vec<Entry> = tracts
            .into_iter()
            .filter_map(|tract| {
                let bbox = tract.boundary.bounding_rect()?;
                Some(Entry {
                    id: tract.id.clone(),
                    bbox,
                    boundary: tract.boundary.clone(),
                })
            })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        entries.dedup_by(|later, earlier| later.id == earlier.id);
        debug!(tracts = entries.len(), "Built tract index");
        Self { entries }
    }

    /// Number of indexed tracts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no tracts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn containing(&self, coord: Coord<f64>) -> impl Iterator<Item = &Entry> {
        self.entries
            .iter()
            .filter(move |e| e.bbox.intersects(&coord) && e.boundary.intersects(&coord))
    }

    /// Assign every stop to a tract.
    #[must_use]
    pub fn join(&self, stops: &[StopRecord]) -> SpatialJoin {
        let mut report = JoinReport {
            stops: stops.len(),
            ..JoinReport::default()
        };

        let assignments = stops
            .iter()
            .map(|stop| {
                let Some(point) = stop.location else {
                    report.invalid_coordinates += 1;
                    return Assignment::InvalidCoordinate;
                };
                let mut hits = self.containing(point.0);
                match hits.next() {
                    Some(first) => {
                        if hits.next().is_some() {
                            report.ambiguous += 1;
                        }
                        report.assigned += 1;
                        Assignment::Tract(first.id.clone())
                    }
                    None => {
                        report.unassigned += 1;
                        Assignment::Unassigned
                    }
                }
            })
            .collect();

        info!(
            assigned = report.assigned,
            unassigned = report.unassigned,
            invalid = report.invalid_coordinates,
            ambiguous = report.ambiguous,
            "Spatial join complete"
        );
        SpatialJoin {
            assignments,
            report,
        }
    }
}

/// Build an index over `tracts` and join `stops` against it.
#[must_use]
pub fn spatial_join(stops: &[StopRecord], tracts: &[CensusTract]) -> SpatialJoin {
    TractIndex::new(tracts).join(stops)
}
