pub mod fetch;
pub mod grid;
pub mod proxy;
pub mod query;
pub mod rate_limit;
pub mod results;
pub mod reviews;
pub mod splitter;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use fetch::{FetchPage, Fetcher, HttpFetcher, ResponseParser, ReviewParser};
pub use results::{CoverageGap, GapReason, ResultSet, RunStats};
pub use reviews::{enrich_reviews, ReviewFetcher};
pub use splitter::{CancelHandle, GridSplitter, SplitConfig};
