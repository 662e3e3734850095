use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Spaces out sequential page requests to stay under an upstream per-second quota.
///
/// Shared by clones, so every paginated fetch through one adapter draws from the same
/// budget.
#[derive(Clone)]
pub struct PagePacer {
    limiter: Option<Arc<DirectRateLimiter>>,
}

impl PagePacer {
    /// `0` disables pacing.
    pub fn per_second(pages: u32) -> Self {
        let limiter = NonZeroU32::new(pages)
            .map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate))));
        Self { limiter }
    }

    pub fn unpaced() -> Self {
        Self { limiter: None }
    }

    /// Waits until the next page may be requested.
    pub async fn until_ready(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    pub fn is_paced(&self) -> bool {
        self.limiter.is_some()
    }
}

impl std::fmt::Debug for PagePacer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PagePacer")
            .field("paced", &self.is_paced())
            .finish()
    }
}
