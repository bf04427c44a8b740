//! Shared token-bucket rate limiter for the fetch layer.
//!
//! One bucket is shared across all concurrent cell queries. `quota` tokens
//! refill continuously over `window`; an `acquire` that finds the bucket
//! empty sleeps until the next token matures.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub struct RateLimiter {
    quota: u32,
    window: Duration,
    state: Mutex<Bucket>,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// `quota` requests per `window`. A zero quota disables limiting.
    pub fn new(quota: u32, window: Duration) -> Self {
        Self {
            quota,
            window,
            state: Mutex::new(Bucket {
                tokens: quota as f64,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, sleeping until one is available.
    pub async fn acquire(&self) {
        if self.quota == 0 {
            return;
        }
        let refill_per_sec = self.quota as f64 / self.window.as_secs_f64();

        loop {
            let wait = {
                let mut bucket = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * refill_per_sec).min(self.quota as f64);
                bucket.last_refill = now;

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / refill_per_sec)
            };

            debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }
}

// ===========================================================================
// Unit tests
// ===========================================================================
