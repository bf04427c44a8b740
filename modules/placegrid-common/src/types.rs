use serde::{Deserialize, Serialize};

use crate::error::PlacegridError;

// --- Geo Types ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// Haversine great-circle distance between two lat/lng points in kilometers.
pub fn haversine_km(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// Rectangular geographic bounding box. `min < max` on both axes is enforced
/// at construction; every derived cell goes through the same constructor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Region {
    pub fn new(
        min_lat: f64,
        max_lat: f64,
        min_lng: f64,
        max_lng: f64,
    ) -> Result<Self, PlacegridError> {
        if !min_lat.is_finite() || !max_lat.is_finite() || !min_lng.is_finite() || !max_lng.is_finite()
        {
            return Err(PlacegridError::InvalidRegion(
                "coordinates must be finite".to_string(),
            ));
        }
        if min_lat >= max_lat {
            return Err(PlacegridError::InvalidRegion(format!(
                "min_lat {min_lat} must be < max_lat {max_lat}"
            )));
        }
        if min_lng >= max_lng {
            return Err(PlacegridError::InvalidRegion(format!(
                "min_lng {min_lng} must be < max_lng {max_lng}"
            )));
        }
        Ok(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: (self.min_lat + self.max_lat) / 2.0,
            lng: (self.min_lng + self.max_lng) / 2.0,
        }
    }

    pub fn lat_span(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    pub fn lng_span(&self) -> f64 {
        self.max_lng - self.min_lng
    }

    /// Corner-to-corner extent in kilometers. Used as the "cell size" when
    /// deciding whether a cell is still worth splitting.
    pub fn diagonal_km(&self) -> f64 {
        haversine_km(self.min_lat, self.min_lng, self.max_lat, self.max_lng)
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lng >= self.min_lng && lng <= self.max_lng
    }

    /// Grow the box by `margin_frac` of its own span on every side,
    /// clamped to valid lat/lng bounds.
    pub fn inflate(&self, margin_frac: f64) -> Self {
        let lat_margin = self.lat_span() * margin_frac;
        let lng_margin = self.lng_span() * margin_frac;
        Self {
            min_lat: (self.min_lat - lat_margin).max(-90.0),
            max_lat: (self.max_lat + lat_margin).min(90.0),
            min_lng: (self.min_lng - lng_margin).max(-180.0),
            max_lng: (self.max_lng + lng_margin).min(180.0),
        }
    }
}

// --- Entities ---

/// A single review attached to a place. Opaque to the splitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub author: String,
    pub rating: u8,
    pub text: String,
    pub date: String,
    #[serde(default)]
    pub likes: u32,
}

/// A deduplicated business listing. `place_id` is the stable identity key;
/// every other field is opaque payload carried through the splitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub place_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub total_reviews: u32,
    #[serde(default)]
    pub price_level: Option<String>,
    #[serde(default)]
    pub coordinates: Option<GeoPoint>,
    #[serde(default)]
    pub plus_code: Option<String>,
    #[serde(default)]
    pub opening_hours: serde_json::Value,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub popular_times: serde_json::Value,
    #[serde(default)]
    pub share_link: String,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

impl Place {
    /// Minimal constructor for callers that only have identity + name.
    pub fn new(place_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            place_id: place_id.into(),
            name: name.into(),
            category: None,
            address: String::new(),
            phone: None,
            website: None,
            rating: None,
            total_reviews: 0,
            price_level: None,
            coordinates: None,
            plus_code: None,
            opening_hours: serde_json::Value::Null,
            images: Vec::new(),
            attributes: Vec::new(),
            popular_times: serde_json::Value::Null,
            share_link: String::new(),
            reviews: Vec::new(),
        }
    }
}

// --- Search input ---

pub const MAX_RESULTS_CEILING: u32 = 1000;
pub const MAX_REVIEWS_CEILING: u32 = 500;

/// What the caller wants searched. Validated once at the top of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchInput {
    pub query: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    #[serde(default)]
    pub include_reviews: bool,
    #[serde(default = "default_max_reviews")]
    pub max_reviews_per_place: u32,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_max_results() -> u32 {
    100
}

fn default_max_reviews() -> u32 {
    50
}

impl SearchInput {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            language: default_language(),
            max_results: default_max_results(),
            include_reviews: false,
            max_reviews_per_place: default_max_reviews(),
        }
    }

    pub fn validate(&self) -> Result<(), PlacegridError> {
        if self.query.trim().is_empty() {
            return Err(PlacegridError::InvalidInput(
                "query must not be empty".to_string(),
            ));
        }
        if self.max_results == 0 || self.max_results > MAX_RESULTS_CEILING {
            return Err(PlacegridError::InvalidInput(format!(
                "max_results must be in 1..={MAX_RESULTS_CEILING}, got {}",
                self.max_results
            )));
        }
        if self.max_reviews_per_place > MAX_REVIEWS_CEILING {
            return Err(PlacegridError::InvalidInput(format!(
                "max_reviews_per_place must be at most {MAX_REVIEWS_CEILING}, got {}",
                self.max_reviews_per_place
            )));
        }
        Ok(())
    }
}

// ===========================================================================
// Unit tests
// ===========================================================================
