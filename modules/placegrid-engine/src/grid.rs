//! Quadrant geometry for the grid splitter.
//!
//! Pure functions that subdivide a region into overlapping child cells.
//! All traversal policy (depth, retries, concurrency) lives in `splitter`.

use placegrid_common::Region;

/// Split a region into 4 equal-area quadrants, each inflated by
/// `overlap_frac` of its own span so entities sitting on a shared boundary
/// land in at least one child. `overlap_frac` must be > 0.
pub fn split_quadrants(parent: &Region, overlap_frac: f64) -> [Region; 4] {
    let mid_lat = (parent.min_lat + parent.max_lat) / 2.0;
    let mid_lng = (parent.min_lng + parent.max_lng) / 2.0;

    let sw = Region {
        min_lat: parent.min_lat,
        max_lat: mid_lat,
        min_lng: parent.min_lng,
        max_lng: mid_lng,
    };
    let se = Region {
        min_lat: parent.min_lat,
        max_lat: mid_lat,
        min_lng: mid_lng,
        max_lng: parent.max_lng,
    };
    let nw = Region {
        min_lat: mid_lat,
        max_lat: parent.max_lat,
        min_lng: parent.min_lng,
        max_lng: mid_lng,
    };
    let ne = Region {
        min_lat: mid_lat,
        max_lat: parent.max_lat,
        min_lng: mid_lng,
        max_lng: parent.max_lng,
    };

    [
        sw.inflate(overlap_frac),
        se.inflate(overlap_frac),
        nw.inflate(overlap_frac),
        ne.inflate(overlap_frac),
    ]
}

/// Whether the children of `parent` would still be above the minimum cell
/// size. Children are half the parent's extent per axis, so their diagonal
/// is roughly half the parent's.
pub fn splittable(parent: &Region, min_cell_km: f64) -> bool {
    parent.diagonal_km() / 2.0 >= min_cell_km
}

// ===========================================================================
// Unit tests
// ===========================================================================
