//! Global token-bucket rate limiter for broadcast fan-out, since the chat
//! platform caps message throughput per bot. Built on `governor`'s
//! lock-free in-memory limiter.

use std::num::NonZeroU32;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};

pub struct BroadcastRateLimiter {
    inner: GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl BroadcastRateLimiter {
    pub fn new(messages_per_second: u32) -> Self {
        let quota = Quota::per_second(
            NonZeroU32::new(messages_per_second).expect("rate must be nonzero"),
        );
        BroadcastRateLimiter {
            inner: GovernorRateLimiter::direct(quota),
        }
    }

    /// Suspends until a send slot is available. Every `deliver_one` task
    /// calls this before sending, so backpressure is by queue depth, never
    /// by per-recipient concurrency slots.
    pub async fn acquire(&self) {
        self.inner.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn acquire_throttles_to_configured_rate() {
        let limiter = BroadcastRateLimiter::new(50);
        let start = Instant::now();
        for _ in 0..60 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() >= std::time::Duration::from_millis(150));
    }
}
