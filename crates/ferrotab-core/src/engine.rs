//! HTTP request engine: URL guard, timeout profile, retry loop and body detection.
//!
//! Every remote adapter goes through [`RequestEngine::request`]. The loop is
//!
//! 1. validate the target with [`UrlValidator`] (no I/O happens on failure),
//! 2. for `attempt` in `0..=max_retries`, sleep [`Backoff::delay`] then issue the call,
//! 3. classify the outcome; final failures return at once, retryable ones loop,
//! 4. after the last attempt the most recent error is returned.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::data_source::{FetchError, FetchErrorKind};
use crate::diagnostics::{DiagnosticEvent, Diagnostics, TracingDiagnostics};
use crate::http_client::{HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse};
use crate::retry::Backoff;
use crate::url_guard::UrlValidator;
use crate::ValidationError;

/// Timeout and retry tier selected per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestProfile {
    #[default]
    DataFetch,
    HealthCheck,
    CacheWarmup,
}

impl RequestProfile {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataFetch => "data-fetch",
            Self::HealthCheck => "health-check",
            Self::CacheWarmup => "cache-warmup",
        }
    }

    pub const fn timeout(self) -> Duration {
        match self {
            Self::DataFetch => Duration::from_secs(30),
            Self::HealthCheck | Self::CacheWarmup => Duration::from_secs(10),
        }
    }

    pub const fn max_retries(self) -> u32 {
        match self {
            Self::DataFetch => 3,
            Self::HealthCheck => 1,
            Self::CacheWarmup => 2,
        }
    }
}

impl Display for RequestProfile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestProfile {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "data-fetch" => Ok(Self::DataFetch),
            "health-check" => Ok(Self::HealthCheck),
            "cache-warmup" => Ok(Self::CacheWarmup),
            _ => Err(ValidationError::InvalidRequestProfile {
                value: value.to_owned(),
            }),
        }
    }
}

/// How a successful body should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyExpectation {
    /// JSON when the content type says so or the body opens with `{` / `[`.
    #[default]
    Auto,
    /// Never parse; CSV exports use this.
    Raw,
}

/// Per-call knobs layered over a [`RequestProfile`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestOptions {
    pub profile: RequestProfile,
    pub max_retries: Option<u32>,
    pub timeout: Option<Duration>,
    pub headers: BTreeMap<String, String>,
    pub auth: Option<HttpAuth>,
    pub expect: BodyExpectation,
}

impl RequestOptions {
    pub fn new(profile: RequestProfile) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.auth = Some(HttpAuth::BearerToken(token.into()));
        self
    }

    pub fn expecting(mut self, expect: BodyExpectation) -> Self {
        self.expect = expect;
        self
    }

    pub fn effective_max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(self.profile.max_retries())
    }

    pub fn effective_timeout(&self) -> Duration {
        self.timeout.unwrap_or(self.profile.timeout())
    }
}

/// Classified body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Raw(String),
}

impl ResponseBody {
    pub fn into_json(self) -> Result<Value, FetchError> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Raw(body) => {
                serde_json::from_str(&body).map_err(|e| FetchError::json_parse(e.to_string()))
            }
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Json(value) => value.to_string(),
            Self::Raw(body) => body,
        }
    }
}

/// Successful engine call.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineResponse {
    pub status: u16,
    pub body: ResponseBody,
    pub attempts: u32,
}

/// Running counters exposed for observability.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct EngineStats {
    pub total_requests: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retries: u64,
    pub average_latency_ms: f64,
}

#[derive(Debug, Default)]
struct StatsInner {
    total_requests: u64,
    succeeded: u64,
    failed: u64,
    retries: u64,
    success_latency: Duration,
}

/// Executes one logical request with validation, retry and body classification.
pub struct RequestEngine {
    http_client: Arc<dyn HttpClient>,
    validator: UrlValidator,
    backoff: Backoff,
    diagnostics: Arc<dyn Diagnostics>,
    stats: Mutex<StatsInner>,
}

impl RequestEngine {
    pub fn new(http_client: Arc<dyn HttpClient>, validator: UrlValidator) -> Self {
        Self {
            http_client,
            validator,
            backoff: Backoff::default(),
            diagnostics: Arc::new(TracingDiagnostics::default()),
            stats: Mutex::new(StatsInner::default()),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn Diagnostics>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn validator(&self) -> &UrlValidator {
        &self.validator
    }

    pub fn stats(&self) -> EngineStats {
        let stats = self.stats.lock().expect("engine stats lock is not poisoned");
        let average_latency_ms = if stats.succeeded == 0 {
            0.0
        } else {
            stats.success_latency.as_secs_f64() * 1000.0 / stats.succeeded as f64
        };
        EngineStats {
            total_requests: stats.total_requests,
            succeeded: stats.succeeded,
            failed: stats.failed,
            retries: stats.retries,
            average_latency_ms,
        }
    }

    /// Runs the request loop for `url`.
    pub async fn request(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<EngineResponse, FetchError> {
        self.update_stats(|stats| stats.total_requests += 1);

        let target = match self.validator.validate(url).await {
            Ok(target) => target,
            Err(error) => {
                if matches!(error.kind(), FetchErrorKind::Security) {
                    self.diagnostics.record(DiagnosticEvent::TargetBlocked {
                        host: host_label(url),
                    });
                }
                self.update_stats(|stats| stats.failed += 1);
                return Err(error);
            }
        };
        let host = target.host_str().unwrap_or_default().to_owned();
        let max_retries = options.effective_max_retries();

        let mut last_error = None;
        let mut attempts = 0;
        for attempt in 0..=max_retries {
            let delay = self.backoff.delay(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if attempt > 0 {
                self.update_stats(|stats| stats.retries += 1);
            }

            attempts += 1;
            let started = Instant::now();
            match self.attempt(&target, options).await {
                Ok((status, body)) => {
                    let elapsed = started.elapsed();
                    self.update_stats(|stats| {
                        stats.succeeded += 1;
                        stats.success_latency += elapsed;
                    });
                    return Ok(EngineResponse {
                        status,
                        body,
                        attempts,
                    });
                }
                Err(error) => {
                    self.diagnostics.record(DiagnosticEvent::AttemptFailed {
                        host: host.clone(),
                        attempt,
                        error: error.clone(),
                    });
                    let retryable = error.retryable();
                    last_error = Some(error);
                    if !retryable {
                        break;
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| FetchError::network("request was not attempted"));
        self.update_stats(|stats| stats.failed += 1);
        self.diagnostics.record(DiagnosticEvent::RequestFailed {
            host,
            attempts,
            error: error.clone(),
        });
        Err(error)
    }

    async fn attempt(
        &self,
        target: &Url,
        options: &RequestOptions,
    ) -> Result<(u16, ResponseBody), FetchError> {
        let mut request =
            HttpRequest::get(target.as_str()).with_timeout(options.effective_timeout());
        for (name, value) in &options.headers {
            request = request.with_header(name.as_str(), value.as_str());
        }
        if let Some(auth) = &options.auth {
            request = request.with_auth(auth);
        }

        let response = self
            .http_client
            .execute(request)
            .await
            .map_err(transport_error)?;
        let status = response.status;
        classify(response, options.expect).map(|body| (status, body))
    }

    fn update_stats(&self, update: impl FnOnce(&mut StatsInner)) {
        let mut stats = self.stats.lock().expect("engine stats lock is not poisoned");
        update(&mut stats);
    }
}

fn transport_error(error: HttpError) -> FetchError {
    if error.is_blocked() {
        FetchError::security(error.message())
    } else {
        FetchError::transport(error.message(), error.retryable())
    }
}

fn classify(response: HttpResponse, expect: BodyExpectation) -> Result<ResponseBody, FetchError> {
    if !response.is_success() {
        return Err(FetchError::http_status(response.status));
    }
    match expect {
        BodyExpectation::Raw => Ok(ResponseBody::Raw(response.body)),
        BodyExpectation::Auto if looks_like_json(response.content_type.as_deref(), &response.body) => {
            serde_json::from_str(&response.body)
                .map(ResponseBody::Json)
                .map_err(|e| FetchError::json_parse(format!("response body is not valid JSON: {e}")))
        }
        BodyExpectation::Auto => Ok(ResponseBody::Raw(response.body)),
    }
}

fn looks_like_json(content_type: Option<&str>, body: &str) -> bool {
    if content_type.is_some_and(|value| value.to_ascii_lowercase().contains("json")) {
        return true;
    }
    matches!(
        body.trim_start_matches('\u{feff}').trim_start().chars().next(),
        Some('{' | '[')
    )
}

// Host only; never echo a URL that may carry credentials or tokens.
fn host_label(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_owned))
        .unwrap_or_else(|| String::from("<unparseable>"))
}
