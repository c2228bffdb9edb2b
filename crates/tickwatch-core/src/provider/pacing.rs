//! Minimum inter-request spacing for quota-capped providers.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Serializes outbound call *timing* for one provider.
///
/// Call initiation may be concurrent; every caller awaits [`acquire`] before
/// touching the transport, so later calls queue behind the spacing floor.
/// This is independent of retry backoff: a retried attempt goes through the
/// pacer again like any other call.
///
/// [`acquire`]: RequestPacer::acquire
#[derive(Clone)]
pub struct RequestPacer {
    limiter: Arc<DirectRateLimiter>,
    spacing: Duration,
}

impl RequestPacer {
    pub fn new(min_spacing: Duration) -> Self {
        let spacing = min_spacing.max(Duration::from_millis(1));
        let quota = Quota::with_period(spacing)
            .expect("spacing is always greater than zero")
            .allow_burst(NonZeroU32::new(1).expect("burst of one is non-zero"));

        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            spacing,
        }
    }

    /// Wait until the spacing floor permits the next outbound call.
    pub async fn acquire(&self) {
        self.limiter.until_ready().await;
    }

    pub const fn min_spacing(&self) -> Duration {
        self.spacing
    }
}
