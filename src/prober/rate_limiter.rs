//! Rate limiting for native probers.
//!
//! Token bucket rate limiting that paces outgoing requests. One limiter is
//! built per run and cloned into every prober call.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovLimiter,
};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

/// A shared requests-per-second limiter.
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Arc<GovLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    rate: NonZeroU32,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter").field("per_second", &self.rate).finish()
    }
}

impl RateLimiter {
    /// Create a limiter allowing `rate` operations per second.
    ///
    /// Returns `None` for a rate of 0, meaning unlimited.
    pub fn per_second(rate: u32) -> Option<Self> {
        let rate = NonZeroU32::new(rate)?;
        Some(Self {
            limiter: Arc::new(GovLimiter::direct(Quota::per_second(rate))),
            rate,
        })
    }

    /// Wait until a token is available.
    pub async fn wait(&self) {
        self.limiter.until_ready().await;
    }

    /// Try to acquire a token without waiting.
    #[cfg(test)]
    pub(crate) fn try_acquire(&self) -> bool {
        self.limiter.check().is_ok()
    }
}

/// Wait on an optional limiter.
pub async fn pace(limiter: &Option<RateLimiter>) {
    if let Some(limiter) = limiter {
        limiter.wait().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rate_is_unlimited() {
        assert!(RateLimiter::per_second(0).is_none());
    }

    #[tokio::test]
    async fn test_rate_limiter_wait() {
        let limiter = RateLimiter::per_second(1000).unwrap();
        assert!(limiter.try_acquire());
        limiter.wait().await;
    }

    #[test]
    fn test_clones_share_state() {
        let a = RateLimiter::per_second(1).unwrap();
        let b = a.clone();
        assert!(a.try_acquire());
        assert!(!b.try_acquire());
    }
}
