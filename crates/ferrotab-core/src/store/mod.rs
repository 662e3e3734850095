//! TTL key-value storage shared by the response cache and the rate limiter.
//!
//! | Store | Backing | Availability |
//! |-------|---------|--------------|
//! | [`InMemoryStore`] | process-local map | always |
//! | `RedisStore` | Redis server | `redis` feature |

mod memory;
#[cfg(feature = "redis")]
mod redis;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

pub use memory::InMemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;

/// Storage backend failure. Callers degrade instead of failing the fetch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend unavailable: {0}")]
    Unavailable(String),
    #[error("stored value under '{key}' is not a counter")]
    NotACounter { key: String },
}

pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Generic TTL-expiring key-value store.
///
/// Values are opaque strings; callers own serialization. Expired entries must read as
/// absent. `increment` must be atomic with respect to concurrent callers of the same
/// store: a missing or expired key starts at 1 and receives `ttl`, later increments keep
/// the original expiry.
pub trait KeyValueStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    fn set_with_ttl<'a>(&'a self, key: &'a str, value: String, ttl: Duration)
        -> StoreFuture<'a, ()>;

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;

    fn increment<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, u64>;
}
