use thiserror::Error;

/// Errors surfaced by the fetch collaborator. The splitter only cares about
/// the transient/persistent distinction; everything else is diagnostic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Rate limited by upstream: {0}")]
    RateLimited(String),

    #[error("Anti-bot block detected: {0}")]
    Blocked(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl FetchError {
    /// Whether a retry with backoff has any chance of succeeding.
    /// Blocks and parse failures won't get better by asking again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Timeout(_) | FetchError::Connection(_) | FetchError::RateLimited(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum PlacegridError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Invalid search input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}
