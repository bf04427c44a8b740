//! Scripted fetchers for exercising the splitter without a network.
//!
//! `ScriptedFetcher` serves a synthetic world of places and applies the
//! platform cap the way the real upstream does: a cell returns at most
//! `cap` results and reports truncation when the cap is hit.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use placegrid_common::{FetchError, GeoPoint, Place, Region, Review, SearchInput};

use crate::fetch::{FetchPage, Fetcher};
use crate::reviews::ReviewFetcher;

/// Generate a `rows x cols` lattice of places evenly spread over `region`,
/// keyed `{prefix}-{row}-{col}`.
pub fn uniform_places(region: &Region, rows: u32, cols: u32, prefix: &str) -> Vec<Place> {
    let mut places = Vec::with_capacity((rows * cols) as usize);
    for r in 0..rows {
        for c in 0..cols {
            // Offset by half a step so no place sits on the outer edge.
            let lat = region.min_lat + region.lat_span() * (r as f64 + 0.5) / rows as f64;
            let lng = region.min_lng + region.lng_span() * (c as f64 + 0.5) / cols as f64;
            let mut place = Place::new(format!("{prefix}-{r}-{c}"), format!("Place {r}/{c}"));
            place.coordinates = Some(GeoPoint { lat, lng });
            places.push(place);
        }
    }
    places
}

// --- ScriptedFetcher ---

pub struct ScriptedFetcher {
    world: Vec<Place>,
    cap: usize,
    calls: AtomicU64,
}

impl ScriptedFetcher {
    pub fn new(world: Vec<Place>, cap: usize) -> Self {
        Self {
            world,
            cap,
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, cell: &Region, _input: &SearchInput) -> Result<FetchPage, FetchError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let in_cell: Vec<Place> = self
            .world
            .iter()
            .filter(|p| {
                p.coordinates
                    .map(|c| cell.contains(c.lat, c.lng))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        let truncated = in_cell.len() >= self.cap;
        let places = in_cell.into_iter().take(self.cap).collect();
        Ok(FetchPage { places, truncated })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// --- FlakyFetcher ---

/// Fails the first `fail_first` calls with a fixed error, then delegates.
pub struct FlakyFetcher {
    inner: Arc<dyn Fetcher>,
    error: FetchError,
    fail_first: u64,
    calls: AtomicU64,
}

impl FlakyFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, error: FetchError, fail_first: u64) -> Self {
        Self {
            inner,
            error,
            fail_first,
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Fetcher for FlakyFetcher {
    async fn fetch(&self, cell: &Region, input: &SearchInput) -> Result<FetchPage, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        if call < self.fail_first {
            return Err(self.error.clone());
        }
        self.inner.fetch(cell, input).await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

// --- PoisonRegionFetcher ---

/// Fails any cell fully contained in the poison region; everything else is
/// delegated. The root region is never contained, so traversal starts
/// normally and only the poisoned subtree fails.
pub struct PoisonRegionFetcher {
    inner: Arc<dyn Fetcher>,
    poison: Region,
    error: FetchError,
}

impl PoisonRegionFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, poison: Region, error: FetchError) -> Self {
        Self {
            inner,
            poison,
            error,
        }
    }
}

fn contained_in(cell: &Region, outer: &Region) -> bool {
    cell.min_lat >= outer.min_lat
        && cell.max_lat <= outer.max_lat
        && cell.min_lng >= outer.min_lng
        && cell.max_lng <= outer.max_lng
}

#[async_trait]
impl Fetcher for PoisonRegionFetcher {
    async fn fetch(&self, cell: &Region, input: &SearchInput) -> Result<FetchPage, FetchError> {
        if contained_in(cell, &self.poison) {
            return Err(self.error.clone());
        }
        self.inner.fetch(cell, input).await
    }

    fn name(&self) -> &str {
        "poison-region"
    }
}

// --- ScriptedReviewFetcher ---

/// Serves a canned pool of reviews per place and fails listed place ids
/// with a fixed error. Tracks how many fetches ran concurrently.
pub struct ScriptedReviewFetcher {
    reviews: HashMap<String, Vec<Review>>,
    failing: HashSet<String>,
    calls: AtomicU64,
    in_flight: AtomicU64,
    max_in_flight: AtomicU64,
}

impl ScriptedReviewFetcher {
    pub fn new(reviews: HashMap<String, Vec<Review>>) -> Self {
        Self {
            reviews,
            failing: HashSet::new(),
            calls: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            max_in_flight: AtomicU64::new(0),
        }
    }

    pub fn failing_for(mut self, place_ids: impl IntoIterator<Item = String>) -> Self {
        self.failing = place_ids.into_iter().collect();
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn max_in_flight(&self) -> u64 {
        self.max_in_flight.load(Ordering::Relaxed)
    }
}

/// `n` interchangeable reviews for one place.
pub fn canned_reviews(n: usize) -> Vec<Review> {
    (0..n)
        .map(|i| Review {
            author: format!("Reviewer {i}"),
            rating: 4,
            text: format!("Visit number {i} was fine."),
            date: "2 weeks ago".to_string(),
            likes: 0,
        })
        .collect()
}

#[async_trait]
impl ReviewFetcher for ScriptedReviewFetcher {
    async fn fetch_reviews(
        &self,
        place: &Place,
        max_reviews: u32,
    ) -> Result<Vec<Review>, FetchError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let live = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(live, Ordering::SeqCst);
        // Yield so concurrent fetches overlap.
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(&place.place_id) {
            return Err(FetchError::Blocked("review page blocked".to_string()));
        }
        let mut reviews = self
            .reviews
            .get(&place.place_id)
            .cloned()
            .unwrap_or_default();
        reviews.truncate(max_reviews as usize);
        Ok(reviews)
    }
}

// --- HangingFetcher ---

/// Never completes. Used to verify cancellation aborts in-flight queries.
pub struct HangingFetcher;

#[async_trait]
impl Fetcher for HangingFetcher {
    async fn fetch(&self, _cell: &Region, _input: &SearchInput) -> Result<FetchPage, FetchError> {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
        }
    }

    fn name(&self) -> &str {
        "hanging"
    }
}
