//! # Ferrotab Core
//!
//! Safe acquisition of tabular data from remote JSON endpoints, CSV and spreadsheet
//! exports, paginated record APIs and allow-listed local files.
//!
//! ## Overview
//!
//! - **URL guard** rejecting loopback, private, link-local and reserved targets before any I/O
//! - **Request engine** with timeout profiles, exponential backoff and JSON/raw body detection
//! - **Source adapters** normalising each wire format into a [`Dataset`]
//! - **SWR cache** serving fresh and stale entries with a revalidation signal
//! - **Post-processing** for root extraction, column selection and sort
//!
//! ## Feature Flags
//!
//! | Flag | Description |
//! |------|-------------|
//! | `default` | In-memory store only |
//! | `redis` | [`store::RedisStore`] backed by a Redis server |
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Local-file, JSON, CSV and paginated-API adapters |
//! | [`cache`] | Stale-while-revalidate cache |
//! | [`config`] | Tunables and environment overlay |
//! | [`data_source`] | Adapter trait and the fetch error type |
//! | [`diagnostics`] | Injected diagnostics sink |
//! | [`domain`] | Source descriptors, rows and datasets |
//! | [`engine`] | HTTP request engine |
//! | [`error`] | Validation errors |
//! | [`fetcher`] | Orchestrator tying parsing, cache and adapters together |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`postprocess`] | Root path, column selection, sort |
//! | [`rate_limit`] | Per-caller fixed-window limiter |
//! | [`retry`] | Backoff schedule |
//! | [`store`] | TTL key-value stores |
//! | [`throttle`] | Page pacing for paginated APIs |
//! | [`url_guard`] | SSRF guard |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ferrotab_core::{FetchConfig, FetchOptions, Fetcher, InMemoryStore, ReqwestHttpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fetcher = Fetcher::from_config(
//!         &FetchConfig::from_env(),
//!         Arc::new(ReqwestHttpClient::new()),
//!         Arc::new(InMemoryStore::new()),
//!     );
//!
//!     let response = fetcher
//!         .fetch("https://example.com/data.json", &FetchOptions::default())
//!         .await?;
//!     println!("{} rows ({:?})", response.dataset.len(), response.cache);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Fetcher        │────▶│ SWR Cache        │──┐
//! └────────┬────────┘     └──────────────────┘  │
//!          │              ┌──────────────────┐  │  ┌──────────────┐
//!          ├─────────────▶│ Rate Limiter     │──┴─▶│ KeyValueStore│
//!          ▼              └──────────────────┘     └──────────────┘
//! ┌─────────────────┐     ┌──────────────────┐
//! │ Source Adapters │────▶│ Request Engine   │──▶ URL guard, HttpClient
//! └────────┬────────┘     └──────────────────┘
//!          ▼
//! ┌─────────────────┐
//! │ Dataset         │──▶ postprocess ──▶ TableView
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Every fetch path returns [`FetchError`]:
//!
//! ```rust
//! use ferrotab_core::{FetchError, FetchErrorKind};
//!
//! fn handle_error(error: FetchError) -> &'static str {
//!     match error.kind() {
//!         FetchErrorKind::Security => "refused",
//!         _ if error.retryable() => "try later",
//!         _ => error.public_message(),
//!     }
//! }
//! ```

pub mod adapters;
pub mod cache;
pub mod config;
pub mod data_source;
pub mod diagnostics;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod http_client;
pub mod postprocess;
pub mod rate_limit;
pub mod retry;
pub mod store;
pub mod throttle;
pub mod url_guard;

pub use adapters::{CsvAdapter, JsonAdapter, LocalFileAdapter, PaginatedApiAdapter};

pub use cache::{CacheEntry, CacheHit, CacheNamespace, Freshness, SwrCache};

pub use config::FetchConfig;

pub use data_source::{
    AdapterFuture, FetchError, FetchErrorKind, PaginatedApiFailure, SourceAdapter, SourceFamily,
};

pub use diagnostics::{DiagnosticEvent, Diagnostics, RecordingDiagnostics, TracingDiagnostics};

pub use domain::{Cell, Dataset, LocalMounts, Row, Scalar, SourceDescriptor};

pub use engine::{
    BodyExpectation, EngineResponse, EngineStats, RequestEngine, RequestOptions, RequestProfile,
    ResponseBody,
};

pub use error::ValidationError;

pub use fetcher::{CacheStatus, FetchOptions, FetchResponse, Fetcher, FetcherBuilder};

pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, MockHttpClient,
    ReqwestHttpClient,
};

pub use postprocess::{
    sort_rows, ColumnSelection, ColumnToken, RootPath, SortDirection, TableView,
};

pub use rate_limit::{CallerIdentity, RateLimitPolicy, RateLimiter};

pub use retry::Backoff;

pub use store::{InMemoryStore, KeyValueStore, StoreError};

pub use throttle::PagePacer;

pub use url_guard::{is_public_ip, HostResolver, SystemResolver, UrlValidator};
