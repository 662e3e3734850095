//! Stale-while-revalidate cache over a [`KeyValueStore`].
//!
//! Entries carry the unix second they were fetched at. Their age decides how they are
//! served:
//!
//! | Age | [`Freshness`] | Served |
//! |-----|---------------|--------|
//! | `age < staleness_threshold` | `Fresh` | yes |
//! | `staleness_threshold <= age < ttl` | `Stale` | yes, caller should revalidate |
//! | `age >= ttl` | `Expired` | no (miss) |
//!
//! The store expires keys after `ttl` on its own; the age check covers stores whose
//! clock or expiry is coarser than ours.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::config::FetchConfig;
use crate::domain::SourceDescriptor;
use crate::store::{KeyValueStore, StoreError};

/// Independent key spaces of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    RawData,
    RenderedArtifact,
}

impl CacheNamespace {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RawData => "rawData",
            Self::RenderedArtifact => "renderedArtifact",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

/// Stored payload plus the moment it was fetched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub payload: T,
    /// Unix seconds.
    pub fetched_at: i64,
}

impl<T> CacheEntry<T> {
    pub fn new(payload: T) -> Self {
        Self::with_fetched_at(payload, unix_now())
    }

    pub const fn with_fetched_at(payload: T, fetched_at: i64) -> Self {
        Self {
            payload,
            fetched_at,
        }
    }

    /// Age at `now`; an entry from the future counts as brand new.
    pub fn age_at(&self, now: i64) -> Duration {
        Duration::from_secs(u64::try_from(now.saturating_sub(self.fetched_at)).unwrap_or(0))
    }
}

/// Result of a cache read that found a servable entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheHit<T> {
    pub entry: CacheEntry<T>,
    pub freshness: Freshness,
}

pub struct SwrCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
    staleness_threshold: Duration,
    version: String,
}

impl SwrCache {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration, staleness_threshold: Duration) -> Self {
        Self {
            store,
            ttl,
            staleness_threshold,
            version: String::from("v1"),
        }
    }

    pub fn from_config(store: Arc<dyn KeyValueStore>, config: &FetchConfig) -> Self {
        Self::new(store, config.ttl, config.staleness_threshold)
            .with_version(config.schema_version.clone())
    }

    /// Version tag folded into every fingerprint; bumping it orphans old entries.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    pub const fn staleness_threshold(&self) -> Duration {
        self.staleness_threshold
    }

    /// `{namespace}:{sha256(source, params, version)}`.
    pub fn fingerprint(&self, namespace: CacheNamespace, source: &str, params: &str) -> String {
        let mut hasher = Sha256::new();
        for part in [source, params, self.version.as_str()] {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]);
        }
        format!("{}:{}", namespace.as_str(), hex::encode(hasher.finalize()))
    }

    pub fn raw_key(&self, descriptor: &SourceDescriptor, params: &str) -> String {
        self.fingerprint(CacheNamespace::RawData, &descriptor.fingerprint_input(), params)
    }

    pub fn rendered_key(&self, descriptor: &SourceDescriptor, display_options: &str) -> String {
        self.fingerprint(
            CacheNamespace::RenderedArtifact,
            &descriptor.fingerprint_input(),
            display_options,
        )
    }

    pub fn freshness_at<T>(&self, entry: &CacheEntry<T>, now: i64) -> Freshness {
        let age = entry.age_at(now);
        if age < self.staleness_threshold {
            Freshness::Fresh
        } else if age < self.ttl {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }

    pub fn freshness<T>(&self, entry: &CacheEntry<T>) -> Freshness {
        self.freshness_at(entry, unix_now())
    }

    pub fn is_stale<T>(&self, entry: &CacheEntry<T>) -> bool {
        self.freshness(entry) != Freshness::Fresh
    }

    /// Reads `key`. Expired and undecodable entries read as a miss.
    pub async fn get<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<CacheHit<T>>, StoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(error) => {
                tracing::debug!(key, error = %error, "discarding undecodable cache entry");
                return Ok(None);
            }
        };
        match self.freshness(&entry) {
            Freshness::Expired => Ok(None),
            freshness => Ok(Some(CacheHit { entry, freshness })),
        }
    }

    /// Writes `payload` under `key`, stamped now, and records the key against `source`
    /// so [`invalidate_source`](Self::invalidate_source) can find it.
    pub async fn set<T: Serialize>(
        &self,
        source: &SourceDescriptor,
        key: &str,
        payload: &T,
    ) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(&CacheEntry::new(payload))
            .map_err(|error| StoreError::Unavailable(format!("cache entry encoding: {error}")))?;
        self.store.set_with_ttl(key, encoded, self.ttl).await?;
        self.index_key(source, key).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.store.delete(key).await
    }

    /// Removes every entry written for `source` in either namespace. Returns the number
    /// of keys dropped.
    pub async fn invalidate_source(&self, source: &SourceDescriptor) -> Result<usize, StoreError> {
        let index_key = self.index_key_for(source);
        let keys = self.indexed_keys(&index_key).await?;
        for key in &keys {
            self.store.delete(key).await?;
        }
        self.store.delete(&index_key).await?;
        Ok(keys.len())
    }

    pub async fn get_rendered<T: DeserializeOwned>(
        &self,
        source: &SourceDescriptor,
        display_options: &str,
    ) -> Result<Option<CacheHit<T>>, StoreError> {
        self.get(&self.rendered_key(source, display_options)).await
    }

    pub async fn set_rendered<T: Serialize>(
        &self,
        source: &SourceDescriptor,
        display_options: &str,
        artifact: &T,
    ) -> Result<(), StoreError> {
        let key = self.rendered_key(source, display_options);
        self.set(source, &key, artifact).await
    }

    fn index_key_for(&self, source: &SourceDescriptor) -> String {
        let mut hasher = Sha256::new();
        hasher.update(source.fingerprint_input().as_bytes());
        hasher.update([0x1f]);
        hasher.update(self.version.as_bytes());
        format!("cacheIndex:{}", hex::encode(hasher.finalize()))
    }

    // Read-modify-write; concurrent writers for one source may drop an index entry, which
    // only means that key lives until its TTL.
    async fn index_key(&self, source: &SourceDescriptor, key: &str) -> Result<(), StoreError> {
        let index_key = self.index_key_for(source);
        let mut keys = self.indexed_keys(&index_key).await?;
        if keys.iter().any(|existing| existing == key) {
            return Ok(());
        }
        keys.push(key.to_owned());
        let encoded = serde_json::to_string(&keys)
            .map_err(|error| StoreError::Unavailable(format!("cache index encoding: {error}")))?;
        self.store.set_with_ttl(&index_key, encoded, self.ttl).await
    }

    async fn indexed_keys(&self, index_key: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .store
            .get(index_key)
            .await?
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default())
    }
}

fn unix_now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Cell, Dataset, Row};
    use crate::store::InMemoryStore;

    fn cache() -> SwrCache {
        SwrCache::new(
            Arc::new(InMemoryStore::new()),
            Duration::from_secs(3600),
            Duration::from_secs(300),
        )
    }

    fn source() -> SourceDescriptor {
        SourceDescriptor::parse("https://data.example.com/items.json").expect("valid source")
    }

    #[test]
    fn freshness_follows_age_thresholds() {
        let cache = cache();
        let now = 1_700_000_000;

        let entry = CacheEntry::with_fetched_at((), now - 60);
        assert_eq!(cache.freshness_at(&entry, now), Freshness::Fresh);

        let entry = CacheEntry::with_fetched_at((), now - 400);
        assert_eq!(cache.freshness_at(&entry, now), Freshness::Stale);

        let entry = CacheEntry::with_fetched_at((), now - 4000);
        assert_eq!(cache.freshness_at(&entry, now), Freshness::Expired);
    }

    #[test]
    fn fingerprints_separate_namespaces_params_and_versions() {
        let cache = cache();
        let raw = cache.fingerprint(CacheNamespace::RawData, "s", "p");
        let rendered = cache.fingerprint(CacheNamespace::RenderedArtifact, "s", "p");
        let other_params = cache.fingerprint(CacheNamespace::RawData, "s", "q");
        let other_version = cache
            .with_version("v2")
            .fingerprint(CacheNamespace::RawData, "s", "p");

        assert!(raw.starts_with("rawData:"));
        assert!(rendered.starts_with("renderedArtifact:"));
        assert_ne!(raw, other_params);
        assert_ne!(raw, other_version);
        assert_eq!(raw.len(), "rawData:".len() + 64);
    }

    #[test]
    fn token_never_appears_in_keys() {
        let cache = cache();
        let source = SourceDescriptor::parse("airtable://app123/Table?token=patSECRET")
            .expect("valid source");
        assert!(!cache.raw_key(&source, "").contains("patSECRET"));
    }

    #[tokio::test]
    async fn set_then_get_is_fresh() {
        let cache = cache();
        let source = source();
        let key = cache.raw_key(&source, "");
        let dataset = Dataset::new(vec![Row::new().with("a", Cell::text("1"))]);

        cache.set(&source, &key, &dataset).await.expect("write succeeds");
        let hit = cache
            .get::<Dataset>(&key)
            .await
            .expect("read succeeds")
            .expect("entry present");

        assert_eq!(hit.freshness, Freshness::Fresh);
        assert_eq!(hit.entry.payload, dataset);
    }

    #[tokio::test]
    async fn invalidate_source_clears_both_namespaces() {
        let cache = cache();
        let source = source();
        let raw_key = cache.raw_key(&source, "");
        cache.set(&source, &raw_key, &Dataset::default()).await.expect("write");
        cache
            .set_rendered(&source, "theme=plain", &String::from("<table/>"))
            .await
            .expect("write");

        let removed = cache.invalidate_source(&source).await.expect("invalidate");

        assert_eq!(removed, 2);
        assert!(cache.get::<Dataset>(&raw_key).await.expect("read").is_none());
        assert!(cache
            .get_rendered::<String>(&source, "theme=plain")
            .await
            .expect("read")
            .is_none());
    }

    #[tokio::test]
    async fn undecodable_entry_reads_as_miss() {
        let store = Arc::new(InMemoryStore::new());
        store
            .set_with_ttl("rawData:bad", String::from("not json"), Duration::from_secs(60))
            .await
            .expect("write");
        let cache = SwrCache::new(store, Duration::from_secs(3600), Duration::from_secs(300));

        assert!(cache.get::<Dataset>("rawData:bad").await.expect("read").is_none());
    }
}
