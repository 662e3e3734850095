use std::fmt::{Display, Formatter};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::store::KeyValueStore;

/// Fixed-window quota applied per caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(60),
        }
    }
}

/// Who a fetch is attributed to. Authenticated users win over network addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallerIdentity {
    User(String),
    Address(IpAddr),
}

impl CallerIdentity {
    pub fn resolve(user_id: Option<&str>, address: IpAddr) -> Self {
        match user_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => Self::User(id.to_owned()),
            None => Self::Address(address),
        }
    }

    fn storage_key(&self) -> String {
        match self {
            Self::User(id) => format!("ratelimit:user:{id}"),
            Self::Address(address) => format!("ratelimit:ip:{address}"),
        }
    }
}

impl Display for CallerIdentity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Address(address) => write!(f, "ip:{address}"),
        }
    }
}

/// Per-caller fixed-window limiter backed by a [`KeyValueStore`] counter.
///
/// The first call of a window creates the counter with the window as TTL; the store
/// expires it, which rolls the window over.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }

    pub const fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Counts this call and reports whether it exceeds the window's ceiling.
    ///
    /// A store failure lets the call through: limiting is a courtesy to upstreams and
    /// must not take fetching down with the counter backend.
    pub async fn is_limited(&self, identity: &CallerIdentity) -> bool {
        let key = identity.storage_key();
        match self.store.increment(&key, self.policy.window).await {
            Ok(count) => count > u64::from(self.policy.max_requests),
            Err(error) => {
                tracing::warn!(caller = %identity, error = %error, "rate limit counter unavailable; allowing call");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::store::InMemoryStore;

    fn limiter(max_requests: u32, window: Duration) -> RateLimiter {
        RateLimiter::new(
            Arc::new(InMemoryStore::new()),
            RateLimitPolicy {
                max_requests,
                window,
            },
        )
    }

    #[tokio::test]
    async fn allows_exactly_the_ceiling_then_blocks() {
        let limiter = limiter(3, Duration::from_secs(60));
        let caller = CallerIdentity::User(String::from("42"));

        for _ in 0..3 {
            assert!(!limiter.is_limited(&caller).await);
        }
        assert!(limiter.is_limited(&caller).await);
        assert!(limiter.is_limited(&caller).await);
    }

    #[tokio::test]
    async fn callers_are_counted_separately() {
        let limiter = limiter(1, Duration::from_secs(60));
        let first = CallerIdentity::Address(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1)));
        let second = CallerIdentity::Address(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 2)));

        assert!(!limiter.is_limited(&first).await);
        assert!(limiter.is_limited(&first).await);
        assert!(!limiter.is_limited(&second).await);
    }

    #[tokio::test]
    async fn window_rollover_resets_the_count() {
        let limiter = limiter(1, Duration::from_millis(60));
        let caller = CallerIdentity::User(String::from("7"));

        assert!(!limiter.is_limited(&caller).await);
        assert!(limiter.is_limited(&caller).await);
        tokio::time::sleep(Duration::from_millis(90)).await;
        assert!(!limiter.is_limited(&caller).await);
    }

    #[test]
    fn identity_prefers_authenticated_user() {
        let address = IpAddr::V4(Ipv4Addr::new(198, 51, 100, 9));
        assert_eq!(
            CallerIdentity::resolve(Some("12"), address),
            CallerIdentity::User(String::from("12"))
        );
        assert_eq!(
            CallerIdentity::resolve(Some("  "), address),
            CallerIdentity::Address(address)
        );
        assert_eq!(
            CallerIdentity::resolve(None, address),
            CallerIdentity::Address(address)
        );
    }

    #[test]
    fn default_policy_is_thirty_per_minute() {
        let policy = RateLimitPolicy::default();
        assert_eq!(policy.max_requests, 30);
        assert_eq!(policy.window, Duration::from_secs(60));
    }
}
