//! The fetch collaborator seam.
//!
//! `Fetcher` is the one interface the splitter depends on. `HttpFetcher` is
//! the production implementation: rate-limited, proxy-rotated HTTP requests
//! with error classification. Turning a response body into place records is
//! delegated to a caller-supplied `ResponseParser` — selector design is
//! deliberately not part of this crate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{info, warn};

use placegrid_common::{Config, FetchError, Place, PlacegridError, Region, Review, SearchInput};

use crate::proxy::ProxyRotator;
use crate::query;
use crate::rate_limit::RateLimiter;
use crate::reviews::ReviewFetcher;

/// One page of results for one cell.
#[derive(Debug, Clone)]
pub struct FetchPage {
    pub places: Vec<Place>,
    /// Result count hit the per-query cap — more entities may exist.
    pub truncated: bool,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, cell: &Region, input: &SearchInput) -> Result<FetchPage, FetchError>;
    fn name(&self) -> &str;
}

/// Extracts place records from a raw response body.
pub trait ResponseParser: Send + Sync {
    fn parse(&self, body: &str) -> Result<Vec<Place>, FetchError>;
}

/// Extracts review records from a raw place-page body.
pub trait ReviewParser: Send + Sync {
    fn parse(&self, body: &str) -> Result<Vec<Review>, FetchError>;
}

/// Language to request results in: the per-search choice wins, the
/// configured default covers inputs that leave it blank.
fn effective_language<'a>(requested: &'a str, fallback: &'a str) -> &'a str {
    if requested.is_empty() {
        fallback
    } else {
        requested
    }
}

// --- HTTP fetcher ---

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub struct HttpFetcher {
    /// One client per proxy URL; reqwest binds proxies at client build time.
    proxied_clients: HashMap<String, reqwest::Client>,
    direct: reqwest::Client,
    rotator: ProxyRotator,
    limiter: RateLimiter,
    parser: Arc<dyn ResponseParser>,
    review_parser: Option<Arc<dyn ReviewParser>>,
    language: String,
    country: String,
    cap: usize,
}

impl HttpFetcher {
    pub fn new(
        config: &Config,
        cap: usize,
        parser: Arc<dyn ResponseParser>,
    ) -> Result<Self, PlacegridError> {
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let direct = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| PlacegridError::Config(format!("Failed to build HTTP client: {e}")))?;

        let mut proxied_clients = HashMap::new();
        for url in &config.proxy_urls {
            let proxy = reqwest::Proxy::all(url)
                .map_err(|e| PlacegridError::Config(format!("Invalid proxy URL {url}: {e}")))?;
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(USER_AGENT)
                .proxy(proxy)
                .build()
                .map_err(|e| {
                    PlacegridError::Config(format!("Failed to build proxied client: {e}"))
                })?;
            proxied_clients.insert(url.clone(), client);
        }

        Ok(Self {
            proxied_clients,
            direct,
            rotator: ProxyRotator::new(config.proxy_urls.clone()),
            limiter: RateLimiter::new(config.rate_limit, Duration::from_secs(config.rate_window_secs)),
            parser,
            review_parser: None,
            language: config.language.clone(),
            country: config.country.clone(),
            cap,
        })
    }

    /// Enable review fetching. Without a parser the fetcher serves search
    /// pages only and `fetch_reviews` fails fast.
    pub fn with_review_parser(mut self, parser: Arc<dyn ReviewParser>) -> Self {
        self.review_parser = Some(parser);
        self
    }

    /// Rate-limited GET through the rotator, with status and block-page
    /// classification. Returns the body when it is worth parsing.
    async fn request_body(&self, url: &str) -> Result<String, FetchError> {
        self.limiter.acquire().await;

        let proxy = self.rotator.next();
        let client = proxy
            .as_deref()
            .and_then(|p| self.proxied_clients.get(p))
            .unwrap_or(&self.direct);

        info!(url, proxy = proxy.as_deref().unwrap_or("direct"), "Fetching page");

        let response = match client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                if let Some(p) = &proxy {
                    self.rotator.report_failure(p);
                }
                return Err(classify_transport(&e));
            }
        };

        if let Some(err) = classify_status(response.status()) {
            if let Some(p) = &proxy {
                self.rotator.report_failure(p);
            }
            warn!(url, status = %response.status(), "Upstream rejected request");
            return Err(err);
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Connection(format!("Failed to read body: {e}")))?;

        if looks_blocked(&body) {
            if let Some(p) = &proxy {
                self.rotator.report_failure(p);
            }
            warn!(url, "Block page detected in response body");
            return Err(FetchError::Blocked("interstitial block page".to_string()));
        }

        if let Some(p) = &proxy {
            self.rotator.report_success(p);
        }
        Ok(body)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, cell: &Region, input: &SearchInput) -> Result<FetchPage, FetchError> {
        let language = effective_language(&input.language, &self.language);
        let url = query::build_search_url(cell, input, language, &self.country);

        let body = self.request_body(&url).await?;
        let places = self.parser.parse(&body)?;

        let truncated = places.len() >= self.cap;
        info!(
            url = url.as_str(),
            count = places.len(),
            truncated,
            "Fetched cell"
        );
        Ok(FetchPage { places, truncated })
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[async_trait]
impl ReviewFetcher for HttpFetcher {
    async fn fetch_reviews(
        &self,
        place: &Place,
        max_reviews: u32,
    ) -> Result<Vec<Review>, FetchError> {
        let parser = self.review_parser.as_ref().ok_or_else(|| {
            FetchError::MalformedResponse("no review parser configured".to_string())
        })?;

        let Some(url) = query::build_review_url(place, &self.language) else {
            warn!(
                place_id = place.place_id.as_str(),
                name = place.name.as_str(),
                "No review link available, skipping"
            );
            return Ok(Vec::new());
        };

        let body = self.request_body(&url).await?;
        let mut reviews = parser.parse(&body)?;
        reviews.truncate(max_reviews as usize);

        info!(url = url.as_str(), count = reviews.len(), "Fetched reviews");
        Ok(reviews)
    }
}

fn classify_transport(e: &reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout(e.to_string())
    } else {
        FetchError::Connection(e.to_string())
    }
}

/// Status-code classification. `None` means the response is worth parsing.
fn classify_status(status: StatusCode) -> Option<FetchError> {
    match status {
        s if s.is_success() => None,
        StatusCode::TOO_MANY_REQUESTS => {
            Some(FetchError::RateLimited("HTTP 429".to_string()))
        }
        StatusCode::FORBIDDEN => Some(FetchError::Blocked("HTTP 403".to_string())),
        s => Some(FetchError::Connection(format!("HTTP {s}"))),
    }
}

/// Heuristic for anti-bot interstitials served with a 200.
fn looks_blocked(body: &str) -> bool {
    body.contains("/sorry/index")
        || body.contains("unusual traffic from your computer network")
        || body.contains("g-recaptcha")
}

// ===========================================================================
// Unit tests
// ===========================================================================
