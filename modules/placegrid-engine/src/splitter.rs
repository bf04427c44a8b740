//! Recursive grid-splitting search driver.
//!
//! Queries the full region first and only subdivides cells whose result
//! count hit the per-query cap. Truncated cells split into 4 overlapping
//! quadrants; recursion is bounded by depth and minimum cell size. A failed
//! cell marks its subtree partial and never aborts siblings.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use rand::Rng;
use tokio::sync::watch;
use tracing::{info, warn};
use typed_builder::TypedBuilder;

use placegrid_common::{FetchError, PlacegridError, Region, SearchInput};

use crate::fetch::{FetchPage, Fetcher};
use crate::grid;
use crate::results::{GapReason, ResultSet};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Traversal policy. Every constant the upstream leaves unspecified is a
/// field here rather than a hardcoded value.
#[derive(Debug, Clone, TypedBuilder)]
pub struct SplitConfig {
    /// Per-query result cap C imposed by the platform. A cell returning
    /// exactly this many results is treated as truncated.
    pub cap: usize,

    /// Overlap margin between sibling quadrants, as a fraction of cell span.
    #[builder(default = 0.05)]
    pub overlap_frac: f64,

    /// Maximum recursion depth; the root region is depth 0.
    #[builder(default = 5)]
    pub max_depth: u32,

    /// Cells whose children would fall below this diagonal are not split.
    #[builder(default = 0.25)]
    pub min_cell_km: f64,

    /// Fetch attempts per cell, including the first.
    #[builder(default = 3)]
    pub max_attempts: u32,

    /// Base backoff between attempts. Actual delay is base * 2^attempt
    /// plus random jitter (0-1s).
    #[builder(default = Duration::from_secs(3))]
    pub retry_base: Duration,

    /// Concurrent cell queries per wave.
    #[builder(default = 4)]
    pub concurrency: usize,

    /// Operator-side ceiling on unique places, combined with the caller's
    /// `SearchInput.max_results` (the smaller of the two wins).
    #[builder(default = None)]
    pub max_results: Option<usize>,
}

/// Exponential backoff, saturating so absurd attempt counts degrade to
/// "wait a very long time" instead of panicking.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cancels a running grid search. Cancellation stops new cells from being
/// scheduled and aborts in-flight fetches; the run returns whatever it has
/// accumulated, with unqueried cells recorded as coverage gaps.
#[derive(Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

// ---------------------------------------------------------------------------
// GridSplitter
// ---------------------------------------------------------------------------

enum CellResult {
    Page(FetchPage),
    Failed(FetchError),
    Cancelled,
}

struct CellOutcome {
    cell: Region,
    retries: u64,
    result: CellResult,
}

pub struct GridSplitter {
    fetcher: Arc<dyn Fetcher>,
    config: SplitConfig,
    cancel_tx: watch::Sender<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl GridSplitter {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: SplitConfig) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            fetcher,
            config,
            cancel_tx,
            cancel_rx,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    /// Run the full search over `region`. Always returns the accumulated
    /// result set; partial coverage shows up as gaps, not errors.
    pub async fn run(
        &self,
        region: Region,
        input: &SearchInput,
    ) -> Result<ResultSet, PlacegridError> {
        input.validate()?;

        // The caller's budget is operative; the config knob can only tighten it.
        let max_results = match self.config.max_results {
            Some(max) => max.min(input.max_results as usize),
            None => input.max_results as usize,
        };

        let mut results = ResultSet::new();
        results.stats.started_at = Some(Utc::now());

        info!(
            query = input.query.as_str(),
            cap = self.config.cap,
            fetcher = self.fetcher.name(),
            ?region,
            "Starting grid search"
        );

        let mut frontier = vec![region];
        let mut depth = 0u32;

        while !frontier.is_empty() {
            if *self.cancel_rx.borrow() {
                for cell in frontier.drain(..) {
                    results.record_gap(cell, depth, GapReason::Cancelled, None);
                }
                break;
            }

            info!(depth, cells = frontier.len(), "Querying cell wave");

            let outcomes: Vec<CellOutcome> = stream::iter(
                frontier
                    .drain(..)
                    .map(|cell| self.query_cell(cell, depth, input)),
            )
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

            let mut next = Vec::new();
            for outcome in outcomes {
                results.stats.retries += outcome.retries;
                match outcome.result {
                    CellResult::Page(page) => {
                        results.stats.cells_queried += 1;
                        let count = page.places.len();
                        results.merge_all(page.places);

                        if !page.truncated {
                            continue;
                        }
                        results.stats.cells_truncated += 1;

                        if depth + 1 > self.config.max_depth {
                            info!(depth, count, "Truncated cell at depth limit, accepting partial");
                            results.record_gap(outcome.cell, depth, GapReason::DepthLimit, None);
                        } else if !grid::splittable(&outcome.cell, self.config.min_cell_km) {
                            info!(depth, count, "Truncated cell at minimum size, accepting partial");
                            results.record_gap(outcome.cell, depth, GapReason::MinCellSize, None);
                        } else {
                            results.stats.cells_split += 1;
                            next.extend(grid::split_quadrants(
                                &outcome.cell,
                                self.config.overlap_frac,
                            ));
                        }
                    }
                    CellResult::Failed(e) => {
                        results.stats.cells_queried += 1;
                        results.stats.fetch_failures += 1;
                        warn!(depth, error = %e, "Cell failed after retries, marking subtree partial");
                        results.record_gap(
                            outcome.cell,
                            depth,
                            GapReason::FetchFailed,
                            Some(e.to_string()),
                        );
                    }
                    CellResult::Cancelled => {
                        results.record_gap(outcome.cell, depth, GapReason::Cancelled, None);
                    }
                }
            }

            if results.len() >= max_results {
                info!(
                    places = results.len(),
                    max_results,
                    "Result budget reached, stopping traversal"
                );
                break;
            }

            frontier = next;
            depth += 1;
        }

        results.truncate(max_results);
        results.stats.finished_at = Some(Utc::now());
        info!(
            places = results.len(),
            cells_queried = results.stats.cells_queried,
            gaps = results.gaps.len(),
            duplicates_merged = results.stats.duplicates_merged,
            "Grid search finished"
        );
        Ok(results)
    }

    /// Query one cell with bounded retries. Transient failures back off
    /// exponentially with jitter; persistent failures return immediately.
    async fn query_cell(&self, cell: Region, depth: u32, input: &SearchInput) -> CellOutcome {
        let mut cancel = self.cancel_rx.clone();
        let mut retries = 0u64;

        for attempt in 0..self.config.max_attempts {
            if *cancel.borrow() {
                return CellOutcome {
                    cell,
                    retries,
                    result: CellResult::Cancelled,
                };
            }

            let result = tokio::select! {
                res = self.fetcher.fetch(&cell, input) => res,
                _ = cancel.changed() => {
                    return CellOutcome { cell, retries, result: CellResult::Cancelled };
                }
            };

            match result {
                Ok(page) => {
                    return CellOutcome {
                        cell,
                        retries,
                        result: CellResult::Page(page),
                    };
                }
                Err(e) if e.is_retryable() && attempt + 1 < self.config.max_attempts => {
                    retries += 1;
                    let backoff = backoff_delay(self.config.retry_base, attempt);
                    let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
                    warn!(
                        depth,
                        attempt = attempt + 1,
                        backoff_secs = backoff.as_secs(),
                        error = %e,
                        "Cell fetch failed, retrying after backoff"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff.saturating_add(jitter)) => {}
                        _ = cancel.changed() => {
                            return CellOutcome { cell, retries, result: CellResult::Cancelled };
                        }
                    }
                }
                Err(e) => {
                    return CellOutcome {
                        cell,
                        retries,
                        result: CellResult::Failed(e),
                    };
                }
            }
        }

        // Only reachable with max_attempts == 0.
        CellOutcome {
            cell,
            retries,
            result: CellResult::Failed(FetchError::Connection(
                "no fetch attempts configured".to_string(),
            )),
        }
    }
}

// ===========================================================================
// Unit tests
// ===========================================================================
