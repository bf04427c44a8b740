//! End-to-end splitter behavior against scripted fetchers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use placegrid_common::{FetchError, Region, SearchInput};
use placegrid_engine::fetch::{FetchPage, Fetcher};
use placegrid_engine::results::GapReason;
use placegrid_engine::splitter::{GridSplitter, SplitConfig};
use placegrid_engine::testing::{
    uniform_places, FlakyFetcher, HangingFetcher, PoisonRegionFetcher, ScriptedFetcher,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Manhattan-ish bounding box, ~21 km diagonal.
fn manhattan() -> Region {
    Region::new(40.70, 40.88, -74.02, -73.91).unwrap()
}

fn config(cap: usize) -> SplitConfig {
    SplitConfig::builder()
        .cap(cap)
        .retry_base(Duration::from_millis(10))
        .build()
}

/// Search input with the result budget raised to its ceiling, for tests
/// that assert on full-world recovery.
fn uncapped(query: &str) -> SearchInput {
    let mut input = SearchInput::new(query);
    input.max_results = 1000;
    input
}

#[tokio::test]
async fn under_cap_region_issues_exactly_one_query() {
    init_logging();
    let region = manhattan();
    let fetcher = Arc::new(ScriptedFetcher::new(uniform_places(&region, 10, 5, "m"), 120));
    let splitter = GridSplitter::new(fetcher.clone(), config(120));

    let results = splitter
        .run(region, &SearchInput::new("coffee shops"))
        .await
        .unwrap();

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(results.len(), 50);
    assert!(results.is_complete());
    assert_eq!(results.stats.cells_queried, 1);
    assert_eq!(results.stats.cells_truncated, 0);
}

#[tokio::test]
async fn dense_region_splits_and_recovers_everything() {
    init_logging();
    let region = manhattan();
    // 500 places against a cap of 120 forces at least two levels of splitting.
    let world = uniform_places(&region, 25, 20, "m");
    let fetcher = Arc::new(ScriptedFetcher::new(world.clone(), 120));
    let splitter = GridSplitter::new(fetcher.clone(), config(120));

    let results = splitter
        .run(region, &uncapped("restaurants"))
        .await
        .unwrap();

    assert!(fetcher.calls() >= 5, "root + at least 4 quadrants, got {}", fetcher.calls());
    assert!(results.stats.cells_truncated >= 1);
    assert!(results.is_complete());

    // Union of all cells recovers the full world, deduplicated: the map is
    // keyed by place_id, so checking every id covers both the superset and
    // the no-duplicates property.
    assert_eq!(results.len(), world.len());
    for place in &world {
        assert!(
            results.contains_key(&place.place_id),
            "missing {}",
            place.place_id
        );
    }

    // Overlap margins put boundary places in more than one cell; dedup must
    // have had something to do.
    assert!(results.stats.duplicates_merged > 0);
}

#[tokio::test]
async fn recursion_stops_at_max_depth() {
    init_logging();
    let region = manhattan();
    let fetcher = Arc::new(ScriptedFetcher::new(uniform_places(&region, 25, 20, "m"), 10));
    let splitter = GridSplitter::new(
        fetcher,
        SplitConfig::builder()
            .cap(10)
            .max_depth(1)
            .retry_base(Duration::from_millis(10))
            .build(),
    );

    let results = splitter
        .run(region, &SearchInput::new("restaurants"))
        .await
        .unwrap();

    assert!(!results.is_complete());
    assert!(results.gaps.iter().all(|g| g.depth <= 1));
    assert!(results
        .gaps
        .iter()
        .all(|g| g.reason == GapReason::DepthLimit));
    // Depth 1 cells are truncated but never split.
    assert_eq!(results.stats.cells_queried, 5);
}

#[tokio::test]
async fn tiny_cells_stop_at_min_size() {
    init_logging();
    // ~300 m box; children would be under the 250 m floor.
    let region = Region::new(40.700, 40.702, -74.020, -74.018).unwrap();
    let fetcher = Arc::new(ScriptedFetcher::new(uniform_places(&region, 5, 4, "t"), 10));
    let splitter = GridSplitter::new(fetcher.clone(), config(10));

    let results = splitter
        .run(region, &SearchInput::new("food carts"))
        .await
        .unwrap();

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(results.gaps.len(), 1);
    assert_eq!(results.gaps[0].reason, GapReason::MinCellSize);
    assert_eq!(results.len(), 10);
}

#[tokio::test]
async fn failed_subtree_does_not_abort_siblings() {
    init_logging();
    let region = manhattan();
    let world = uniform_places(&region, 25, 20, "m");
    let scripted = Arc::new(ScriptedFetcher::new(world, 120));

    // Poison the SW quadrant (with padding so inflated children stay inside).
    let mid_lat = (region.min_lat + region.max_lat) / 2.0;
    let mid_lng = (region.min_lng + region.max_lng) / 2.0;
    let poison = Region::new(region.min_lat, mid_lat, region.min_lng, mid_lng)
        .unwrap()
        .inflate(0.2);
    let fetcher = Arc::new(PoisonRegionFetcher::new(
        scripted,
        poison,
        FetchError::Blocked("anti-bot block".to_string()),
    ));

    let splitter = GridSplitter::new(fetcher, config(120));
    let results = splitter
        .run(region, &uncapped("restaurants"))
        .await
        .unwrap();

    assert!(!results.is_complete());
    assert!(results
        .gaps
        .iter()
        .any(|g| g.reason == GapReason::FetchFailed));
    let gap = results
        .gaps
        .iter()
        .find(|g| g.reason == GapReason::FetchFailed)
        .unwrap();
    assert!(gap.detail.as_deref().unwrap_or("").contains("block"));

    // Siblings kept working: the NE corner of the world is present.
    assert!(results.contains_key("m-24-19"));
    assert!(results.len() > 300, "got {}", results.len());
    assert!(results.len() < 500, "poisoned subtree should be partial");
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_to_success() {
    let region = manhattan();
    let scripted = Arc::new(ScriptedFetcher::new(uniform_places(&region, 10, 5, "m"), 120));
    let flaky = Arc::new(FlakyFetcher::new(
        scripted,
        FetchError::Timeout("simulated".to_string()),
        2,
    ));
    let splitter = GridSplitter::new(flaky.clone(), config(120));

    let results = splitter
        .run(region, &SearchInput::new("coffee"))
        .await
        .unwrap();

    assert_eq!(flaky.calls(), 3);
    assert_eq!(results.stats.retries, 2);
    assert_eq!(results.len(), 50);
    assert!(results.is_complete());
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_mark_cell_partial() {
    let region = manhattan();
    let scripted = Arc::new(ScriptedFetcher::new(uniform_places(&region, 10, 5, "m"), 120));
    let flaky = Arc::new(FlakyFetcher::new(
        scripted,
        FetchError::Timeout("simulated".to_string()),
        u64::MAX,
    ));
    let splitter = GridSplitter::new(flaky.clone(), config(120));

    let results = splitter
        .run(region, &SearchInput::new("coffee"))
        .await
        .unwrap();

    assert_eq!(flaky.calls(), 3);
    assert_eq!(results.stats.retries, 2);
    assert_eq!(results.stats.fetch_failures, 1);
    assert_eq!(results.gaps.len(), 1);
    assert_eq!(results.gaps[0].reason, GapReason::FetchFailed);
    assert!(results.is_empty());
}

#[tokio::test]
async fn persistent_failures_are_not_retried() {
    init_logging();
    let region = manhattan();
    let scripted = Arc::new(ScriptedFetcher::new(uniform_places(&region, 10, 5, "m"), 120));
    let flaky = Arc::new(FlakyFetcher::new(
        scripted,
        FetchError::Blocked("captcha wall".to_string()),
        u64::MAX,
    ));
    let splitter = GridSplitter::new(flaky.clone(), config(120));

    let results = splitter
        .run(region, &SearchInput::new("coffee"))
        .await
        .unwrap();

    assert_eq!(flaky.calls(), 1, "persistent errors must not be retried");
    assert_eq!(results.stats.retries, 0);
    assert_eq!(results.gaps.len(), 1);
}

#[tokio::test]
async fn cancellation_aborts_in_flight_queries() {
    init_logging();
    let region = manhattan();
    let splitter = Arc::new(GridSplitter::new(Arc::new(HangingFetcher), config(120)));
    let handle = splitter.cancel_handle();

    let task = {
        let splitter = splitter.clone();
        tokio::spawn(async move { splitter.run(region, &SearchInput::new("coffee")).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();

    let results = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("run did not stop after cancel")
        .expect("task panicked")
        .unwrap();

    assert!(results.is_empty());
    assert!(results
        .gaps
        .iter()
        .any(|g| g.reason == GapReason::Cancelled));
}

#[tokio::test]
async fn result_budget_stops_traversal_early() {
    init_logging();
    let region = manhattan();
    let fetcher = Arc::new(ScriptedFetcher::new(uniform_places(&region, 25, 20, "m"), 120));
    let splitter = GridSplitter::new(
        fetcher.clone(),
        SplitConfig::builder()
            .cap(120)
            .max_results(Some(100))
            .retry_base(Duration::from_millis(10))
            .build(),
    );

    let results = splitter
        .run(region, &uncapped("restaurants"))
        .await
        .unwrap();

    // Root query alone satisfies the budget; no quadrants scheduled, and
    // the returned set is trimmed to the budget.
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(results.len(), 100);
}

#[tokio::test]
async fn caller_result_limit_bounds_the_returned_set() {
    init_logging();
    let region = manhattan();
    let fetcher = Arc::new(ScriptedFetcher::new(uniform_places(&region, 10, 5, "m"), 120));
    let splitter = GridSplitter::new(fetcher.clone(), config(120));

    let mut input = SearchInput::new("coffee shops");
    input.max_results = 5;

    let results = splitter.run(region, &input).await.unwrap();

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(results.len(), 5, "per-search limit must bound the output");
}

#[tokio::test]
async fn invalid_input_is_rejected_before_any_fetch() {
    let region = manhattan();
    let fetcher = Arc::new(ScriptedFetcher::new(Vec::new(), 120));
    let splitter = GridSplitter::new(fetcher.clone(), config(120));

    let err = splitter.run(region, &SearchInput::new("  ")).await;
    assert!(err.is_err());
    assert_eq!(fetcher.calls(), 0);
}

// --- Overlap invariant across every generated cell ---

/// Records every cell the splitter asks for.
struct RecordingFetcher {
    inner: Arc<ScriptedFetcher>,
    cells: Mutex<Vec<Region>>,
}

#[async_trait]
impl Fetcher for RecordingFetcher {
    async fn fetch(&self, cell: &Region, input: &SearchInput) -> Result<FetchPage, FetchError> {
        self.cells.lock().unwrap().push(*cell);
        self.inner.fetch(cell, input).await
    }

    fn name(&self) -> &str {
        "recording"
    }
}

#[tokio::test]
async fn generated_cells_carry_overlap_margin_at_every_depth() {
    init_logging();
    let region = manhattan();
    let fetcher = Arc::new(RecordingFetcher {
        inner: Arc::new(ScriptedFetcher::new(uniform_places(&region, 25, 20, "m"), 60)),
        cells: Mutex::new(Vec::new()),
    });
    let splitter = GridSplitter::new(fetcher.clone(), config(60));

    splitter
        .run(region, &uncapped("restaurants"))
        .await
        .unwrap();

    let cells = fetcher.cells.lock().unwrap();
    assert!(cells.len() > 5);

    // Positive-area intersection, not just touching edges.
    fn overlaps(a: &Region, b: &Region) -> bool {
        a.min_lat.max(b.min_lat) < a.max_lat.min(b.max_lat)
            && a.min_lng.max(b.min_lng) < a.max_lng.min(b.max_lng)
    }

    // Every generated quadrant carries an overlap margin, so each non-root
    // cell must share interior area with at least one of its three siblings
    // (cells[0] is the root, scheduled alone in wave zero).
    for (i, cell) in cells.iter().enumerate().skip(1) {
        let has_partner = cells
            .iter()
            .enumerate()
            .skip(1)
            .any(|(j, other)| i != j && overlaps(cell, other));
        assert!(has_partner, "cell {cell:?} shares no area with any sibling");
    }
}
