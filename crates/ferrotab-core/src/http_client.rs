//! Transport seam between the request engine and the network.
//!
//! [`HttpClient`] is the only thing that touches sockets. Production code uses
//! [`ReqwestHttpClient`]; tests script a [`MockHttpClient`].

use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::url_guard;

const MAX_REDIRECTS: usize = 5;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials attached to an outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpAuth {
    BearerToken(String),
    /// Arbitrary header, e.g. an API key. The name is lower-cased.
    Header { name: String, value: String },
}

impl HttpAuth {
    fn header(&self) -> (String, String) {
        match self {
            Self::BearerToken(token) => (String::from("authorization"), format!("Bearer {token}")),
            Self::Header { name, value } => (name.to_ascii_lowercase(), value.clone()),
        }
    }
}

/// A GET against one already-validated URL. Header names are stored lower-case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_auth(self, auth: &HttpAuth) -> Self {
        let (name, value) = auth.header();
        self.with_header(name, value)
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP response envelope returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: None,
            body: body.into(),
        }
    }

    pub fn ok_json(body: impl Into<String>) -> Self {
        Self::new(200, body).with_content_type("application/json")
    }

    pub fn ok_text(body: impl Into<String>) -> Self {
        Self::new(200, body).with_content_type("text/plain")
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
    retryable: bool,
    blocked: bool,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
            blocked: false,
        }
    }

    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
            blocked: false,
        }
    }

    /// The transport refused to continue for safety reasons (e.g. a redirect hop).
    pub fn blocked(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
            blocked: true,
        }
    }

    pub const fn is_blocked(&self) -> bool {
        self.blocked
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;

/// Transport contract used by the request engine.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a>;
}

/// Scripted transport for deterministic offline tests.
///
/// Responses are served in order; once the script runs out the last entry repeats.
/// Every request is recorded for later inspection.
#[derive(Debug, Clone, Default)]
pub struct MockHttpClient {
    script: Arc<Mutex<VecDeque<Result<HttpResponse, HttpError>>>>,
    last: Arc<Mutex<Option<Result<HttpResponse, HttpError>>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responses(responses: impl IntoIterator<Item = HttpResponse>) -> Self {
        let client = Self::new();
        for response in responses {
            client.push(Ok(response));
        }
        client
    }

    pub fn push(&self, outcome: Result<HttpResponse, HttpError>) {
        self.script
            .lock()
            .expect("mock script lock is not poisoned")
            .push_back(outcome);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .expect("mock request log lock is not poisoned")
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests
            .lock()
            .expect("mock request log lock is not poisoned")
            .len()
    }

    fn next_outcome(&self) -> Result<HttpResponse, HttpError> {
        let mut script = self.script.lock().expect("mock script lock is not poisoned");
        let mut last = self.last.lock().expect("mock last lock is not poisoned");
        match script.pop_front() {
            Some(outcome) => {
                *last = Some(outcome.clone());
                outcome
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(HttpError::non_retryable("mock transport has no script"))),
        }
    }
}

impl HttpClient for MockHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        self.requests
            .lock()
            .expect("mock request log lock is not poisoned")
            .push(request);
        let outcome = self.next_outcome();
        Box::pin(async move { outcome })
    }
}

/// Transport backed by a shared `reqwest::Client`.
///
/// Redirects are followed only while each hop still passes the URL guard, so an
/// upstream cannot bounce a request onto an internal address.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ferrotab/", env!("CARGO_PKG_VERSION")))
            .redirect(guarded_redirects())
            .build()
            .unwrap_or_else(|error| {
                tracing::warn!(error = %error, "redirect guard unavailable; using stock client");
                reqwest::Client::new()
            });
        Self::with_client(client)
    }

    /// Wraps a preconfigured client. Its redirect policy is used as-is.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn guarded_redirects() -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error("redirect chain too long")
        } else if let Err(reason) = url_guard::inspect(attempt.url()) {
            attempt.error(reason)
        } else {
            attempt.follow()
        }
    })
}

fn send_error(error: &reqwest::Error) -> HttpError {
    if error.is_redirect() {
        HttpError::blocked(format!("redirect refused: {error}"))
    } else if error.is_builder() {
        HttpError::non_retryable(format!("request could not be built: {error}"))
    } else if error.is_timeout() {
        HttpError::new(format!("timed out: {error}"))
    } else {
        HttpError::new(format!("transport failure: {error}"))
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            let response = request
                .headers
                .iter()
                .fold(self.client.get(&request.url), |builder, (name, value)| {
                    builder.header(name, value)
                })
                .timeout(request.timeout)
                .send()
                .await
                .map_err(|error| send_error(&error))?;

            let status = response.status().as_u16();
            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned);
            let body = response
                .text()
                .await
                .map_err(|error| HttpError::new(format!("body read interrupted: {error}")))?;

            Ok(HttpResponse {
                status,
                content_type,
                body,
            })
        })
    }
}
