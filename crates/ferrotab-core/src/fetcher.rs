use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;

use crate::adapters::{CsvAdapter, JsonAdapter, LocalFileAdapter, PaginatedApiAdapter};
use crate::cache::{Freshness, SwrCache};
use crate::config::FetchConfig;
use crate::data_source::{FetchError, SourceAdapter, SourceFamily};
use crate::diagnostics::{DiagnosticEvent, Diagnostics, TracingDiagnostics};
use crate::domain::{Dataset, LocalMounts, SourceDescriptor};
use crate::engine::{EngineStats, RequestEngine};
use crate::http_client::HttpClient;
use crate::postprocess::RootPath;
use crate::rate_limit::{CallerIdentity, RateLimiter};
use crate::store::KeyValueStore;
use crate::throttle::PagePacer;
use crate::url_guard::{SystemResolver, UrlValidator};

/// Per-call switches for [`Fetcher::fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    pub use_cache: bool,
    /// Part of the cache fingerprint; JSON families only.
    pub root_path: Option<RootPath>,
    /// Skip the cache read but still write the fresh result.
    pub force_refresh: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            root_path: None,
            force_refresh: false,
        }
    }
}

impl FetchOptions {
    pub fn uncached() -> Self {
        Self {
            use_cache: false,
            ..Self::default()
        }
    }

    pub fn with_root_path(mut self, root_path: RootPath) -> Self {
        self.root_path = Some(root_path);
        self
    }

    fn cache_params(&self) -> String {
        match &self.root_path {
            Some(root) => format!("root={root}"),
            None => String::new(),
        }
    }
}

/// Where a returned dataset came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheStatus {
    Fresh,
    /// Served from cache past the staleness threshold; call [`Fetcher::revalidate`].
    Stale,
    Miss,
    Bypassed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub dataset: Dataset,
    pub cache: CacheStatus,
}

/// Parses source strings, dispatches to the matching adapter and wraps the call with the
/// SWR cache.
///
/// Retry lives only in the request engine; the fetcher never repeats an adapter call.
/// Cache store failures degrade to uncached operation.
pub struct Fetcher {
    adapters: HashMap<SourceFamily, Arc<dyn SourceAdapter>>,
    cache: Option<SwrCache>,
    limiter: Option<RateLimiter>,
    mounts: LocalMounts,
    engine: Option<Arc<RequestEngine>>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl Fetcher {
    pub fn builder() -> FetcherBuilder {
        FetcherBuilder::default()
    }

    /// Production wiring: every adapter, the SWR cache and the caller limiter share
    /// `store`; remote adapters share one request engine over `http_client`.
    pub fn from_config(
        config: &FetchConfig,
        http_client: Arc<dyn HttpClient>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let diagnostics: Arc<dyn Diagnostics> =
            Arc::new(TracingDiagnostics::new(config.verbose_diagnostics));
        let validator = if config.resolve_hosts {
            UrlValidator::with_resolver(Arc::new(SystemResolver))
        } else {
            UrlValidator::new()
        };
        let engine = Arc::new(
            RequestEngine::new(http_client, validator)
                .with_backoff(config.backoff)
                .with_diagnostics(diagnostics.clone()),
        );

        let local_roots = config
            .local_roots
            .iter()
            .cloned()
            .chain(config.local_mounts.directories().map(|dir| dir.to_path_buf()));

        Self::builder()
            .with_adapter(Arc::new(LocalFileAdapter::new(local_roots)))
            .with_adapter(Arc::new(
                JsonAdapter::new(engine.clone())
                    .with_profile(config.request_profile)
                    .with_max_retries(config.max_retries),
            ))
            .with_adapter(Arc::new(
                CsvAdapter::new(engine.clone())
                    .with_profile(config.request_profile)
                    .with_max_retries(config.max_retries),
            ))
            .with_adapter(Arc::new(
                PaginatedApiAdapter::new(engine.clone())
                    .with_base_url(config.paginated_api_base.clone())
                    .with_max_pages(config.max_pages)
                    .with_page_size(config.page_size)
                    .with_profile(config.request_profile)
                    .with_max_retries(config.max_retries)
                    .with_pacer(PagePacer::per_second(config.pages_per_second)),
            ))
            .with_cache(SwrCache::from_config(store.clone(), config))
            .with_rate_limiter(RateLimiter::new(store, config.rate_limit))
            .with_local_mounts(config.local_mounts.clone())
            .with_engine(engine)
            .with_diagnostics(diagnostics)
            .build()
    }

    pub fn parse(&self, source: &str) -> Result<SourceDescriptor, FetchError> {
        Ok(SourceDescriptor::parse_with(source, &self.mounts)?)
    }

    pub fn families(&self) -> Vec<SourceFamily> {
        let mut families: Vec<_> = self.adapters.keys().copied().collect();
        families.sort_by_key(|family| family.as_str());
        families
    }

    pub fn engine_stats(&self) -> Option<EngineStats> {
        self.engine.as_ref().map(|engine| engine.stats())
    }

    /// Fetches `source`, serving from cache when allowed.
    pub async fn fetch(
        &self,
        source: &str,
        options: &FetchOptions,
    ) -> Result<FetchResponse, FetchError> {
        let descriptor = self.parse(source)?;

        let Some(cache) = self.cache.as_ref().filter(|_| options.use_cache) else {
            let dataset = self.run_adapter(&descriptor, options).await?;
            return Ok(FetchResponse {
                dataset,
                cache: CacheStatus::Bypassed,
            });
        };

        let key = cache.raw_key(&descriptor, &options.cache_params());
        if !options.force_refresh {
            match cache.get::<Dataset>(&key).await {
                Ok(Some(hit)) => {
                    let status = match hit.freshness {
                        Freshness::Fresh => CacheStatus::Fresh,
                        // `get` already reads expired entries as a miss.
                        Freshness::Stale | Freshness::Expired => CacheStatus::Stale,
                    };
                    tracing::debug!(source = %descriptor, status = ?status, "serving cached dataset");
                    return Ok(FetchResponse {
                        dataset: hit.entry.payload,
                        cache: status,
                    });
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(error = %error, "cache read failed; fetching upstream");
                }
            }
        }

        let dataset = self.run_adapter(&descriptor, options).await?;
        self.store_best_effort(cache, &descriptor, &key, &dataset).await;
        Ok(FetchResponse {
            dataset,
            cache: CacheStatus::Miss,
        })
    }

    /// [`fetch`](Self::fetch) after charging `identity` against the caller limiter.
    pub async fn fetch_as(
        &self,
        identity: &CallerIdentity,
        source: &str,
        options: &FetchOptions,
    ) -> Result<FetchResponse, FetchError> {
        if let Some(limiter) = &self.limiter {
            if limiter.is_limited(identity).await {
                self.diagnostics.record(DiagnosticEvent::CallerLimited {
                    caller: identity.to_string(),
                });
                let policy = limiter.policy();
                return Err(FetchError::caller_rate_limited(format!(
                    "caller exceeded {} requests per {}s",
                    policy.max_requests,
                    policy.window.as_secs()
                )));
            }
        }
        self.fetch(source, options).await
    }

    /// Refetches `source` upstream and overwrites its cache entry. This is the refresh a
    /// caller triggers after being served a [`CacheStatus::Stale`] dataset.
    pub async fn revalidate(
        &self,
        source: &str,
        options: &FetchOptions,
    ) -> Result<Dataset, FetchError> {
        let refresh = FetchOptions {
            use_cache: true,
            force_refresh: true,
            ..options.clone()
        };
        self.fetch(source, &refresh)
            .await
            .map(|response| response.dataset)
    }

    /// Drops every cached entry of `source`. Store failures are logged and count as zero.
    pub async fn invalidate(&self, source: &str) -> Result<usize, FetchError> {
        let descriptor = self.parse(source)?;
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        match cache.invalidate_source(&descriptor).await {
            Ok(removed) => Ok(removed),
            Err(error) => {
                tracing::warn!(source = %descriptor, error = %error, "cache invalidation failed");
                Ok(0)
            }
        }
    }

    async fn run_adapter(
        &self,
        descriptor: &SourceDescriptor,
        options: &FetchOptions,
    ) -> Result<Dataset, FetchError> {
        let family = descriptor.family();
        let adapter = self.adapters.get(&family).ok_or_else(|| {
            FetchError::invalid_source(format!("no adapter registered for {family} sources"))
        })?;

        adapter
            .fetch(descriptor, options.root_path.as_ref())
            .await
            .inspect_err(|error| {
                self.diagnostics.record(DiagnosticEvent::AdapterFailed {
                    family,
                    error: error.clone(),
                });
            })
    }

    async fn store_best_effort(
        &self,
        cache: &SwrCache,
        descriptor: &SourceDescriptor,
        key: &str,
        dataset: &Dataset,
    ) {
        if let Err(error) = cache.set(descriptor, key, dataset).await {
            self.diagnostics.record(DiagnosticEvent::CacheWriteFailed {
                key: key.to_owned(),
                reason: error.to_string(),
            });
        }
    }
}

/// Builder for [`Fetcher`]. Adapters registered later replace earlier ones of the same
/// family.
pub struct FetcherBuilder {
    adapters: HashMap<SourceFamily, Arc<dyn SourceAdapter>>,
    cache: Option<SwrCache>,
    limiter: Option<RateLimiter>,
    mounts: LocalMounts,
    engine: Option<Arc<RequestEngine>>,
    diagnostics: Arc<dyn Diagnostics>,
}

impl Default for FetcherBuilder {
    fn default() -> Self {
        Self {
            adapters: HashMap::new(),
            cache: None,
            limiter: None,
            mounts: LocalMounts::default(),
            engine: None,
            diagnostics: Arc::new(TracingDiagnostics::default()),
        }
    }
}

impl FetcherBuilder {
    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapters.insert(adapter.family(), adapter);
        self
    }

    pub fn with_cache(mut self, cache: SwrCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn with_local_mounts(mut self, mounts: LocalMounts) -> Self {
        self.mounts = mounts;
        self
    }

    pub fn with_engine(mut self, engine: Arc<RequestEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn build(self) -> Fetcher {
        Fetcher {
            adapters: self.adapters,
            cache: self.cache,
            limiter: self.limiter,
            mounts: self.mounts,
            engine: self.engine,
            diagnostics: self.diagnostics,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::diagnostics::RecordingDiagnostics;
    use crate::http_client::{HttpResponse, MockHttpClient};
    use crate::retry::Backoff;
    use crate::store::InMemoryStore;
    use crate::FetchErrorKind;

    const SOURCE: &str = "https://data.example.com/items.json";

    fn fetcher(client: &MockHttpClient) -> Fetcher {
        let config = FetchConfig::default().with_backoff(Backoff::none());
        Fetcher::from_config(&config, Arc::new(client.clone()), Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_cache() {
        let client = MockHttpClient::with_responses([HttpResponse::ok_json(r#"[{"a":1}]"#)]);
        let fetcher = fetcher(&client);

        let first = fetcher.fetch(SOURCE, &FetchOptions::default()).await.expect("fetch");
        let second = fetcher.fetch(SOURCE, &FetchOptions::default()).await.expect("fetch");

        assert_eq!(first.cache, CacheStatus::Miss);
        assert_eq!(second.cache, CacheStatus::Fresh);
        assert_eq!(first.dataset, second.dataset);
        assert_eq!(client.request_count(), 1);
    }

    #[tokio::test]
    async fn uncached_fetch_always_goes_upstream() {
        let client = MockHttpClient::with_responses([HttpResponse::ok_json("[]")]);
        let fetcher = fetcher(&client);

        for _ in 0..2 {
            let response = fetcher.fetch(SOURCE, &FetchOptions::uncached()).await.expect("fetch");
            assert_eq!(response.cache, CacheStatus::Bypassed);
        }
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn invalidate_forces_the_next_fetch_upstream() {
        let client = MockHttpClient::with_responses([HttpResponse::ok_json("[]")]);
        let fetcher = fetcher(&client);

        fetcher.fetch(SOURCE, &FetchOptions::default()).await.expect("fetch");
        assert_eq!(fetcher.invalidate(SOURCE).await, Ok(1));
        let response = fetcher.fetch(SOURCE, &FetchOptions::default()).await.expect("fetch");

        assert_eq!(response.cache, CacheStatus::Miss);
        assert_eq!(client.request_count(), 2);
    }

    #[tokio::test]
    async fn unparseable_source_is_invalid() {
        let fetcher = fetcher(&MockHttpClient::new());
        let error = fetcher
            .fetch("gopher://example.com/x", &FetchOptions::default())
            .await
            .expect_err("unsupported scheme");
        assert_eq!(error.kind(), &FetchErrorKind::InvalidSource);
    }

    #[tokio::test]
    async fn missing_adapter_is_invalid_source() {
        let fetcher = Fetcher::builder().build();
        let error = fetcher
            .fetch(SOURCE, &FetchOptions::default())
            .await
            .expect_err("nothing registered");
        assert_eq!(error.kind(), &FetchErrorKind::InvalidSource);
    }

    #[tokio::test]
    async fn limited_caller_is_refused_before_any_fetch() {
        let client = MockHttpClient::with_responses([HttpResponse::ok_json("[]")]);
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        let engine = Arc::new(
            RequestEngine::new(Arc::new(client.clone()), UrlValidator::new())
                .with_backoff(Backoff::none()),
        );
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        let fetcher = Fetcher::builder()
            .with_adapter(Arc::new(JsonAdapter::new(engine)))
            .with_rate_limiter(RateLimiter::new(
                store,
                crate::rate_limit::RateLimitPolicy {
                    max_requests: 1,
                    window: Duration::from_secs(60),
                },
            ))
            .with_diagnostics(diagnostics.clone())
            .build();
        let caller = CallerIdentity::User(String::from("u1"));

        fetcher
            .fetch_as(&caller, SOURCE, &FetchOptions::uncached())
            .await
            .expect("first call allowed");
        let error = fetcher
            .fetch_as(&caller, SOURCE, &FetchOptions::uncached())
            .await
            .expect_err("second call limited");

        assert_eq!(error.kind(), &FetchErrorKind::CallerRateLimited);
        assert_eq!(client.request_count(), 1);
        assert!(diagnostics
            .events()
            .contains(&DiagnosticEvent::CallerLimited {
                caller: String::from("user:u1")
            }));
    }
}
