//! Review enrichment: a second pass over accumulated places.
//!
//! Reviews live on a per-place page, so they cannot ride along with the
//! search fetch. This pass runs after the grid traversal, pulling review
//! pages in small batches. A failed place keeps its record — reviews are
//! enrichment, not a condition for inclusion.

use async_trait::async_trait;
use futures::{stream, StreamExt};
use tracing::{info, warn};

use placegrid_common::{FetchError, Place, Review, SearchInput};

use crate::results::ResultSet;

/// Review pages are heavier than search pages; keep the batch small.
const REVIEW_BATCH: usize = 3;

#[async_trait]
pub trait ReviewFetcher: Send + Sync {
    async fn fetch_reviews(
        &self,
        place: &Place,
        max_reviews: u32,
    ) -> Result<Vec<Review>, FetchError>;
}

/// Attach reviews to every place in `results`, `REVIEW_BATCH` pages at a
/// time. No-op unless the search asked for reviews. Fetch failures are
/// counted and logged; the affected place stays in the set without reviews.
pub async fn enrich_reviews(
    results: &mut ResultSet,
    fetcher: &dyn ReviewFetcher,
    input: &SearchInput,
) {
    if !input.include_reviews {
        return;
    }

    let targets: Vec<Place> = results.places().cloned().collect();
    if targets.is_empty() {
        return;
    }
    info!(count = targets.len(), "Fetching reviews");

    let max_reviews = input.max_reviews_per_place;
    let mut fetched = stream::iter(targets.into_iter().map(|place| async move {
        let outcome = fetcher.fetch_reviews(&place, max_reviews).await;
        (place.place_id, outcome)
    }))
    .buffer_unordered(REVIEW_BATCH);

    while let Some((place_id, outcome)) = fetched.next().await {
        match outcome {
            Ok(reviews) => {
                results.stats.reviews_fetched += reviews.len() as u64;
                if let Some(place) = results.get_mut(&place_id) {
                    place.reviews = reviews;
                }
            }
            Err(e) => {
                warn!(place_id = place_id.as_str(), error = %e, "Review fetch failed");
                results.stats.review_failures += 1;
            }
        }
    }

    info!(
        reviews = results.stats.reviews_fetched,
        failures = results.stats.review_failures,
        "Review pass finished"
    );
}
