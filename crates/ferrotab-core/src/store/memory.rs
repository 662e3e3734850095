use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{KeyValueStore, StoreError, StoreFuture};

#[derive(Debug, Clone)]
struct StoreEntry {
    value: String,
    expires_at: Instant,
}

impl StoreEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    map: HashMap<String, StoreEntry>,
}

impl StoreInner {
    fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.map
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone())
    }

    fn put(&mut self, key: &str, value: String, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.map
            .insert(key.to_owned(), StoreEntry { value, expires_at });
    }

    fn increment(&mut self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = Instant::now();
        match self.map.get_mut(key).filter(|entry| entry.is_live(now)) {
            Some(entry) => {
                let current = entry
                    .value
                    .parse::<u64>()
                    .map_err(|_| StoreError::NotACounter {
                        key: key.to_owned(),
                    })?;
                let next = current.saturating_add(1);
                entry.value = next.to_string();
                Ok(next)
            }
            None => {
                self.put(key, String::from("1"), ttl);
                Ok(1)
            }
        }
    }

    fn clear_expired(&mut self) {
        let now = Instant::now();
        self.map.retain(|_, entry| entry.is_live(now));
    }
}

/// Process-local store guarded by a tokio `RwLock`. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<tokio::sync::RwLock<StoreInner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove expired entries from the store.
    pub async fn clear_expired(&self) {
        let mut store = self.inner.write().await;
        store.clear_expired();
    }

    /// Clear all entries from the store.
    pub async fn clear(&self) {
        let mut store = self.inner.write().await;
        store.map.clear();
    }

    /// Get the number of entries in the store (including expired entries).
    pub async fn len(&self) -> usize {
        let store = self.inner.read().await;
        store.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl KeyValueStore for InMemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let store = self.inner.read().await;
            Ok(store.get(key))
        })
    }

    fn set_with_ttl<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Duration,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut store = self.inner.write().await;
            store.put(key, value, ttl);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut store = self.inner.write().await;
            store.map.remove(key);
            Ok(())
        })
    }

    fn increment<'a>(&'a self, key: &'a str, ttl: Duration) -> StoreFuture<'a, u64> {
        Box::pin(async move {
            let mut store = self.inner.write().await;
            store.increment(key, ttl)
        })
    }
}
