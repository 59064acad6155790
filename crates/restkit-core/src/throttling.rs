use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

/// Client-side request budget: at most `limit` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub window: Duration,
    pub limit: u32,
}

impl RateLimit {
    pub const fn new(window: Duration, limit: u32) -> Self {
        Self { window, limit }
    }

    pub const fn per_second(limit: u32) -> Self {
        Self::new(Duration::from_secs(1), limit)
    }
}

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Shared limiter enforcing a [`RateLimit`] across every request of one transport.
#[derive(Clone)]
pub struct Throttle {
    limit: RateLimit,
    limiter: Arc<DirectRateLimiter>,
}

impl Throttle {
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            limiter: Arc::new(RateLimiter::direct(quota_from_window(
                limit.window,
                limit.limit,
            ))),
        }
    }

    pub const fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Takes one unit of budget if available without waiting.
    pub fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }

    /// Waits until one unit of budget is available.
    pub async fn acquire(&self) {
        if self.try_acquire() {
            return;
        }
        tracing::debug!(
            limit = self.limit.limit,
            window_ms = self.limit.window.as_millis() as u64,
            "request budget exhausted; waiting for throttle"
        );
        self.limiter.until_ready().await;
    }
}

impl std::fmt::Debug for Throttle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttle").field("limit", &self.limit).finish()
    }
}

fn quota_from_window(quota_window: Duration, quota_limit: u32) -> Quota {
    let burst = NonZeroU32::new(quota_limit).unwrap_or(NonZeroU32::MIN);

    let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(burst.get())).max(0.001);
    let period = Duration::from_secs_f64(seconds_per_cell);

    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}
