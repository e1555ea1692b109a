//! Pacing between asynchronous batch items.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::{num::NonZeroU32, sync::Arc, time::Duration};

type ItemRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Fixed delay and/or token bucket applied before each item of a job.
///
/// The token bucket is shared by every job holding a clone, so it bounds
/// the combined item rate of the process.
#[derive(Clone, Default)]
pub struct ItemThrottle {
    delay: Duration,
    limiter: Option<Arc<ItemRateLimiter>>,
}

impl ItemThrottle {
    /// `items_per_second == 0` disables the token bucket. The bucket holds a
    /// single token so items are spread evenly rather than sent in bursts.
    pub fn new(delay: Duration, items_per_second: u32) -> Self {
        let limiter = NonZeroU32::new(items_per_second)
            .map(|rate| Quota::per_second(rate).allow_burst(NonZeroU32::MIN))
            .map(|quota| Arc::new(RateLimiter::direct(quota)));
        Self { delay, limiter }
    }

    /// No pacing at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_disabled(&self) -> bool {
        self.delay.is_zero() && self.limiter.is_none()
    }

    /// Waits until the next item may run.
    pub async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }
}

impl std::fmt::Debug for ItemThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemThrottle")
            .field("delay", &self.delay)
            .field("rate_limited", &self.limiter.is_some())
            .finish()
    }
}
