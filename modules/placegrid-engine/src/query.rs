//! Search URL construction for map cells.

use placegrid_common::{Place, Region, SearchInput};

const BASE_URL: &str = "https://www.google.com/maps";

/// Build the search URL for one cell: the query anchored at the cell's
/// center, zoomed so the viewport roughly matches the cell's extent.
/// `hl` carries the result language, `gl` the country bias.
pub fn build_search_url(cell: &Region, input: &SearchInput, language: &str, country: &str) -> String {
    let center = cell.center();
    let zoom = zoom_for_span_km(cell.diagonal_km());
    let encoded: String = url::form_urlencoded::byte_serialize(input.query.as_bytes()).collect();

    format!(
        "{BASE_URL}/search/{encoded}/@{lat:.6},{lng:.6},{zoom}z?hl={language}&gl={country}",
        lat = center.lat,
        lng = center.lng,
    )
}

/// Review page URL for one place: the upstream-provided share link when
/// present, otherwise the canonical place URL. `None` when the place
/// carries neither — there is nothing to fetch.
pub fn build_review_url(place: &Place, language: &str) -> Option<String> {
    if !place.share_link.is_empty() {
        return Some(place.share_link.clone());
    }
    if !place.place_id.is_empty() {
        return Some(format!("{BASE_URL}/place/{}?hl={language}", place.place_id));
    }
    None
}

/// Map a cell diagonal to a viewport zoom level. Anchored at 15z for a
/// neighborhood-sized cell (the zoom the upstream uses for plain searches);
/// each halving of the cell adds one level.
fn zoom_for_span_km(diag_km: f64) -> u8 {
    match diag_km {
        d if d >= 80.0 => 10,
        d if d >= 40.0 => 11,
        d if d >= 20.0 => 12,
        d if d >= 10.0 => 13,
        d if d >= 5.0 => 14,
        d if d >= 2.5 => 15,
        d if d >= 1.25 => 16,
        d if d >= 0.6 => 17,
        _ => 18,
    }
}

// ===========================================================================
// Unit tests
// ===========================================================================
