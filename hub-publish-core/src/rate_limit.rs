//! Smoothed token bucket applied to mutating Hub requests.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Used when the rate-limit endpoint cannot be read: 20 requests per minute.
pub const FALLBACK_PERMITS_PER_SECOND: f64 = 20.0 / 60.0;

/// Idle time the bucket may bank as stored permits.
const MAX_BURST_SECONDS: f64 = 1.0;

pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";

#[derive(Debug)]
struct Bucket {
    /// Available permits. Negative once callers are queued for future permits.
    tokens: f64,
    refilled_at: Instant,
}

/// Hands out one permit at a time at a steady rate.
///
/// Permits not used while idle are banked, up to one second's worth (at
/// least one permit), so a short burst after a pause is not throttled. A
/// caller that finds the bucket empty waits for its own permit.
#[derive(Debug)]
pub struct RateLimiter {
    permits_per_second: f64,
    max_permits: f64,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// A non-finite or non-positive rate falls back to
    /// [`FALLBACK_PERMITS_PER_SECOND`].
    pub fn new(permits_per_second: f64) -> Self {
        let rate = if permits_per_second.is_finite() && permits_per_second > 0.0 {
            permits_per_second
        } else {
            FALLBACK_PERMITS_PER_SECOND
        };
        Self {
            permits_per_second: rate,
            max_permits: (MAX_BURST_SECONDS * rate).max(1.0),
            bucket: Mutex::new(Bucket {
                tokens: 1.0,
                refilled_at: Instant::now(),
            }),
        }
    }

    pub fn permits_per_second(&self) -> f64 {
        self.permits_per_second
    }

    /// Wait until one permit is available. Returns how long the caller slept.
    pub async fn acquire(&self) -> Duration {
        let wait = {
            let mut bucket = self.bucket.lock().await;
            let now = Instant::now();
            let elapsed = now.saturating_duration_since(bucket.refilled_at).as_secs_f64();
            bucket.tokens = (bucket.tokens + elapsed * self.permits_per_second).min(self.max_permits);
            bucket.refilled_at = now;

            bucket.tokens -= 1.0;
            if bucket.tokens < 0.0 {
                Duration::from_secs_f64(-bucket.tokens / self.permits_per_second)
            } else {
                Duration::ZERO
            }
        };

        if !wait.is_zero() {
            debug!(wait_ms = wait.as_millis() as u64, "Rate limiter delaying request");
            tokio::time::sleep(wait).await;
        }
        wait
    }
}

/// Sustained rate that spends `remaining` requests evenly until the reset
/// time, never dividing by less than one second.
pub fn compute_rate(remaining: u64, reset_epoch: i64, now_epoch: i64) -> f64 {
    let window = (reset_epoch - now_epoch).max(1);
    remaining as f64 / window as f64
}

/// Read the rate from a rate-limit response's headers.
pub fn rate_from_headers(headers: &reqwest::header::HeaderMap, now_epoch: i64) -> Option<f64> {
    let header = |name: &str| headers.get(name)?.to_str().ok()?.trim().parse::<i64>().ok();
    let remaining = u64::try_from(header(HEADER_REMAINING)?).ok()?;
    let reset = header(HEADER_RESET)?;
    let rate = compute_rate(remaining, reset, now_epoch);
    (rate > 0.0).then_some(rate)
}
