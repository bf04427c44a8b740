//! Round-robin proxy rotation with failure benching.
//!
//! The rotator only hands out URLs; the fetcher owns the per-proxy HTTP
//! clients. Proxies that fail repeatedly are benched for a cooldown period
//! instead of being retired, since residential proxy failures are usually
//! transient.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Consecutive failures before a proxy is benched.
const BENCH_AFTER_FAILURES: u32 = 3;
/// How long a benched proxy sits out.
const BENCH_DURATION: Duration = Duration::from_secs(120);

pub struct ProxyRotator {
    state: Mutex<RotatorState>,
}

struct RotatorState {
    cursor: usize,
    entries: Vec<ProxyEntry>,
}

struct ProxyEntry {
    url: String,
    consecutive_failures: u32,
    benched_until: Option<Instant>,
}

impl ProxyRotator {
    pub fn new(urls: Vec<String>) -> Self {
        if !urls.is_empty() {
            info!(count = urls.len(), "Proxy rotation enabled");
        }
        Self {
            state: Mutex::new(RotatorState {
                cursor: 0,
                entries: urls
                    .into_iter()
                    .map(|url| ProxyEntry {
                        url,
                        consecutive_failures: 0,
                        benched_until: None,
                    })
                    .collect(),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().expect("rotator lock poisoned").entries.is_empty()
    }

    /// Next usable proxy URL, round-robin, skipping benched entries.
    /// Returns `None` when no proxies are configured or all are benched
    /// (callers fall back to a direct connection).
    pub fn next(&self) -> Option<String> {
        let mut state = self.state.lock().expect("rotator lock poisoned");
        if state.entries.is_empty() {
            return None;
        }

        let now = Instant::now();
        let len = state.entries.len();
        for _ in 0..len {
            let idx = state.cursor % len;
            state.cursor = state.cursor.wrapping_add(1);

            let entry = &mut state.entries[idx];
            match entry.benched_until {
                Some(until) if until > now => continue,
                Some(_) => {
                    // Cooldown over, give it another chance
                    entry.benched_until = None;
                    entry.consecutive_failures = 0;
                }
                None => {}
            }
            return Some(entry.url.clone());
        }
        None
    }

    pub fn report_success(&self, url: &str) {
        let mut state = self.state.lock().expect("rotator lock poisoned");
        if let Some(entry) = state.entries.iter_mut().find(|e| e.url == url) {
            entry.consecutive_failures = 0;
        }
    }

    pub fn report_failure(&self, url: &str) {
        let mut state = self.state.lock().expect("rotator lock poisoned");
        if let Some(entry) = state.entries.iter_mut().find(|e| e.url == url) {
            entry.consecutive_failures += 1;
            if entry.consecutive_failures >= BENCH_AFTER_FAILURES {
                entry.benched_until = Some(Instant::now() + BENCH_DURATION);
                warn!(
                    proxy = url,
                    failures = entry.consecutive_failures,
                    bench_secs = BENCH_DURATION.as_secs(),
                    "Benching failing proxy"
                );
            }
        }
    }
}

// ===========================================================================
// Unit tests
// ===========================================================================
