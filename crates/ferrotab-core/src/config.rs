use std::path::PathBuf;
use std::time::Duration;

use crate::domain::LocalMounts;
use crate::engine::RequestProfile;
use crate::rate_limit::RateLimitPolicy;
use crate::retry::Backoff;

pub const DEFAULT_PAGINATED_API_BASE: &str = "https://api.airtable.com/v0";

/// Every tunable of the fetch pipeline, with production defaults.
///
/// # Environment Variables
///
/// | Variable | Field |
/// |----------|-------|
/// | `FERROTAB_CACHE_TTL_SECS` | `ttl` |
/// | `FERROTAB_STALE_AFTER_SECS` | `staleness_threshold` |
/// | `FERROTAB_RATE_LIMIT` | `rate_limit.max_requests` |
/// | `FERROTAB_RATE_WINDOW_SECS` | `rate_limit.window` |
/// | `FERROTAB_MAX_PAGES` | `max_pages` |
/// | `FERROTAB_MAX_RETRIES` | `max_retries` |
/// | `FERROTAB_REQUEST_PROFILE` | `request_profile` (`data-fetch`, `health-check`, `cache-warmup`) |
/// | `FERROTAB_LOCAL_ROOTS` | `local_roots` (platform path-list separator) |
/// | `FERROTAB_RESOLVE_HOSTS` | `resolve_hosts` |
/// | `FERROTAB_VERBOSE` | `verbose_diagnostics` |
/// | `FERROTAB_REDIS_URL` | `redis_url` |
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    pub ttl: Duration,
    pub staleness_threshold: Duration,
    pub rate_limit: RateLimitPolicy,
    pub max_pages: u32,
    pub page_size: u32,
    pub backoff: Backoff,
    /// Timeout and retry tier of every upstream request.
    pub request_profile: RequestProfile,
    /// Overrides the retry ceiling of every request profile when set.
    pub max_retries: Option<u32>,
    pub local_roots: Vec<PathBuf>,
    pub local_mounts: LocalMounts,
    pub resolve_hosts: bool,
    pub verbose_diagnostics: bool,
    pub schema_version: String,
    pub paginated_api_base: String,
    pub pages_per_second: u32,
    pub redis_url: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            staleness_threshold: Duration::from_secs(300),
            rate_limit: RateLimitPolicy::default(),
            max_pages: 50,
            page_size: 100,
            backoff: Backoff::default(),
            request_profile: RequestProfile::DataFetch,
            max_retries: None,
            local_roots: Vec::new(),
            local_mounts: LocalMounts::default(),
            resolve_hosts: false,
            verbose_diagnostics: false,
            schema_version: String::from("v1"),
            paginated_api_base: String::from(DEFAULT_PAGINATED_API_BASE),
            pages_per_second: 5,
            redis_url: None,
        }
    }
}

impl FetchConfig {
    /// Defaults overlaid with `FERROTAB_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    /// Values that fail to parse keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let number = |key: &str| lookup(key).and_then(|value| value.trim().parse::<u64>().ok());
        let flag = |key: &str| lookup(key).and_then(|value| parse_flag(&value));

        if let Some(seconds) = number("FERROTAB_CACHE_TTL_SECS") {
            config.ttl = Duration::from_secs(seconds);
        }
        if let Some(seconds) = number("FERROTAB_STALE_AFTER_SECS") {
            config.staleness_threshold = Duration::from_secs(seconds);
        }
        if let Some(limit) = number("FERROTAB_RATE_LIMIT").and_then(|n| u32::try_from(n).ok()) {
            config.rate_limit.max_requests = limit;
        }
        if let Some(seconds) = number("FERROTAB_RATE_WINDOW_SECS") {
            config.rate_limit.window = Duration::from_secs(seconds);
        }
        if let Some(pages) = number("FERROTAB_MAX_PAGES").and_then(|n| u32::try_from(n).ok()) {
            config.max_pages = pages;
        }
        if let Some(retries) = number("FERROTAB_MAX_RETRIES").and_then(|n| u32::try_from(n).ok()) {
            config.max_retries = Some(retries);
        }
        if let Some(profile) = lookup("FERROTAB_REQUEST_PROFILE")
            .and_then(|value| value.parse::<RequestProfile>().ok())
        {
            config.request_profile = profile;
        }
        if let Some(roots) = lookup("FERROTAB_LOCAL_ROOTS") {
            config.local_roots = std::env::split_paths(&roots)
                .filter(|path| !path.as_os_str().is_empty())
                .collect();
        }
        if let Some(resolve) = flag("FERROTAB_RESOLVE_HOSTS") {
            config.resolve_hosts = resolve;
        }
        if let Some(verbose) = flag("FERROTAB_VERBOSE") {
            config.verbose_diagnostics = verbose;
        }
        config.redis_url = lookup("FERROTAB_REDIS_URL").filter(|url| !url.trim().is_empty());

        config
    }

    pub fn with_local_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.local_roots.push(root.into());
        self
    }

    pub fn with_local_mounts(mut self, mounts: LocalMounts) -> Self {
        self.local_mounts = mounts;
        self
    }

    pub fn with_request_profile(mut self, profile: RequestProfile) -> Self {
        self.request_profile = profile;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
