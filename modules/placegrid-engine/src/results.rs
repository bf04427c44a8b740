//! Deduplicated result accumulation and coverage reporting.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use placegrid_common::{Place, Region};

// ---------------------------------------------------------------------------
// Coverage metadata
// ---------------------------------------------------------------------------

/// Why a cell's subtree could not be fully retrieved. None of these abort
/// the run; they are recorded and reported alongside the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    /// Retries exhausted or a persistent fetch failure.
    FetchFailed,
    /// Cell was truncated but recursion hit the configured depth limit.
    DepthLimit,
    /// Cell was truncated but its children would be below the minimum size.
    MinCellSize,
    /// Run was cancelled before the cell was queried.
    Cancelled,
}

/// A cell whose true result set may be incomplete.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageGap {
    pub region: Region,
    pub depth: u32,
    pub reason: GapReason,
    /// Human-readable detail, e.g. the final fetch error.
    pub detail: Option<String>,
}

// ---------------------------------------------------------------------------
// Run statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunStats {
    pub cells_queried: u64,
    pub cells_truncated: u64,
    pub cells_split: u64,
    pub retries: u64,
    pub fetch_failures: u64,
    pub duplicates_merged: u64,
    pub dropped_missing_key: u64,
    pub reviews_fetched: u64,
    pub review_failures: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// ResultSet
// ---------------------------------------------------------------------------

/// Places accumulated across all cells of a run, keyed by `place_id`.
/// Insertion is idempotent: the first sighting of a key wins and later
/// sightings are counted as duplicates. Output order is unspecified;
/// sorting is the caller's concern.
#[derive(Debug, Default, Serialize)]
pub struct ResultSet {
    places: HashMap<String, Place>,
    pub gaps: Vec<CoverageGap>,
    pub stats: RunStats,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one place. Returns `true` if the key was new. Places without a
    /// stable key are dropped rather than collide under the empty string.
    pub fn insert(&mut self, place: Place) -> bool {
        if place.place_id.is_empty() {
            self.stats.dropped_missing_key += 1;
            debug!(name = place.name.as_str(), "Dropping place with no stable key");
            return false;
        }
        match self.places.entry(place.place_id.clone()) {
            std::collections::hash_map::Entry::Occupied(_) => {
                self.stats.duplicates_merged += 1;
                false
            }
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(place);
                true
            }
        }
    }

    pub fn merge_all(&mut self, places: Vec<Place>) {
        for place in places {
            self.insert(place);
        }
    }

    pub fn record_gap(&mut self, region: Region, depth: u32, reason: GapReason, detail: Option<String>) {
        self.gaps.push(CoverageGap {
            region,
            depth,
            reason,
            detail,
        });
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }

    pub fn contains_key(&self, place_id: &str) -> bool {
        self.places.contains_key(place_id)
    }

    pub fn get(&self, place_id: &str) -> Option<&Place> {
        self.places.get(place_id)
    }

    pub fn get_mut(&mut self, place_id: &str) -> Option<&mut Place> {
        self.places.get_mut(place_id)
    }

    pub fn places(&self) -> impl Iterator<Item = &Place> {
        self.places.values()
    }

    /// Drop arbitrary entries beyond `max`. The set is unordered, so which
    /// entries survive is unspecified too.
    pub fn truncate(&mut self, max: usize) {
        if self.places.len() <= max {
            return;
        }
        let excess: Vec<String> = self.places.keys().skip(max).cloned().collect();
        for key in excess {
            self.places.remove(&key);
        }
    }

    /// Whether the whole region was covered without partial subtrees.
    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }

    pub fn into_places(self) -> Vec<Place> {
        self.places.into_values().collect()
    }
}

// ===========================================================================
// Unit tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_is_idempotent_first_seen_wins() {
        let mut set = ResultSet::new();
        let mut first = Place::new("abc", "First Name");
        first.rating = Some(4.5);
        let second = Place::new("abc", "Second Name");

        assert!(set.insert(first));
        assert!(!set.insert(second));

        assert_eq!(set.len(), 1);
        assert_eq!(set.get("abc").unwrap().name, "First Name");
        assert_eq!(set.get("abc").unwrap().rating, Some(4.5));
        assert_eq!(set.stats.duplicates_merged, 1);
    }

    #[test]
    fn empty_key_is_dropped_not_collided() {
        let mut set = ResultSet::new();
        assert!(!set.insert(Place::new("", "Nameless One")));
        assert!(!set.insert(Place::new("", "Nameless Two")));
        assert!(set.is_empty());
        assert_eq!(set.stats.dropped_missing_key, 2);
    }

    #[test]
    fn truncate_bounds_the_set() {
        let mut set = ResultSet::new();
        for i in 0..10 {
            set.insert(Place::new(format!("p-{i}"), format!("Place {i}")));
        }
        set.truncate(4);
        assert_eq!(set.len(), 4);
        // Truncating below an already-small set is a no-op.
        set.truncate(100);
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn coverage_report_serializes_for_callers() {
        let mut set = ResultSet::new();
        set.insert(Place::new("abc", "Great Coffee Shop"));
        set.record_gap(
            Region::new(44.0, 45.0, -94.0, -93.0).unwrap(),
            3,
            GapReason::DepthLimit,
            None,
        );

        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["gaps"][0]["reason"], "depth_limit");
        assert_eq!(json["gaps"][0]["depth"], 3);
        assert_eq!(json["places"]["abc"]["name"], "Great Coffee Shop");
    }

    #[test]
    fn gaps_mark_run_incomplete() {
        let mut set = ResultSet::new();
        assert!(set.is_complete());
        set.record_gap(
            Region::new(44.0, 45.0, -94.0, -93.0).unwrap(),
            2,
            GapReason::FetchFailed,
            Some("anti-bot block".to_string()),
        );
        assert!(!set.is_complete());
        assert_eq!(set.gaps[0].reason, GapReason::FetchFailed);
    }
}
