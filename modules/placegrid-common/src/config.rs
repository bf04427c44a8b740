use std::env;

use tracing::warn;

/// Fetch-layer configuration loaded from environment variables.
///
/// Everything has a sane default; residential proxies are strongly
/// recommended for production runs but the fetcher works without them.
#[derive(Debug, Clone)]
pub struct Config {
    /// Proxy URLs, rotated per request. Empty = direct connection.
    pub proxy_urls: Vec<String>,

    /// Requests allowed per rate window.
    pub rate_limit: u32,
    /// Rate window length in seconds.
    pub rate_window_secs: u64,

    /// Two-letter country hint passed to the upstream.
    pub country: String,
    /// Language code for result pages.
    pub language: String,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if a set variable fails to parse.
    pub fn from_env() -> Self {
        let proxy_urls: Vec<String> = env::var("PROXY_URLS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if proxy_urls.is_empty() {
            warn!("No proxies configured (PROXY_URLS) - upstream may block requests");
        }

        Self {
            proxy_urls,
            rate_limit: env::var("RATE_LIMIT")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("RATE_LIMIT must be a number"),
            rate_window_secs: env::var("RATE_WINDOW_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .expect("RATE_WINDOW_SECS must be a number"),
            country: env::var("COUNTRY").unwrap_or_else(|_| "us".to_string()),
            language: env::var("LANGUAGE").unwrap_or_else(|_| "en".to_string()),
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("REQUEST_TIMEOUT_SECS must be a number"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            proxy_urls: Vec::new(),
            rate_limit: 30,
            rate_window_secs: 60,
            country: "us".to_string(),
            language: "en".to_string(),
            request_timeout_secs: 30,
        }
    }
}
