//! Adapter contract and the failure type every fetch path returns.
//!
//! Each source family implements [`SourceAdapter`]; the fetcher dispatches a parsed
//! [`SourceDescriptor`] to the adapter whose [`family`](SourceAdapter::family) matches.
//!
//! # Families
//!
//! | Family | Descriptors | Network |
//! |--------|-------------|---------|
//! | [`SourceFamily::Local`] | `Local` | no |
//! | [`SourceFamily::Json`] | `RemoteJson` | yes |
//! | [`SourceFamily::Csv`] | `RemoteCsv`, `GoogleSheet` | yes |
//! | [`SourceFamily::PaginatedApi`] | `PaginatedApi` | yes |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::domain::{Dataset, SourceDescriptor};
use crate::postprocess::RootPath;
use crate::ValidationError;

/// Source family used for adapter registration and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFamily {
    Local,
    Json,
    Csv,
    PaginatedApi,
}

impl SourceFamily {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Json => "json",
            Self::Csv => "csv",
            Self::PaginatedApi => "paginated_api",
        }
    }
}

impl Display for SourceFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Upstream failure classes reported by the paginated record API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaginatedApiFailure {
    AuthFailed,
    PermissionDenied,
    NotFound,
    InvalidRequest,
    RateLimited,
    ServerError,
}

impl PaginatedApiFailure {
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 => Self::AuthFailed,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            _ => Self::InvalidRequest,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthFailed => "auth_failed",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::InvalidRequest => "invalid_request",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
        }
    }

    const fn retryable(self) -> bool {
        matches!(self, Self::RateLimited | Self::ServerError)
    }
}

/// Fetch failure classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchErrorKind {
    Security,
    Network,
    HttpStatus { code: u16 },
    JsonParse,
    PathExtraction { segment: String },
    PaginatedApi(PaginatedApiFailure),
    InvalidSource,
    LocalFile,
    CsvParse,
    CallerRateLimited,
}

/// Structured failure propagated unchanged from adapters through the fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
    retryable: bool,
}

impl FetchError {
    pub fn security(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Security,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Network,
            message: message.into(),
            retryable: true,
        }
    }

    /// Transport failure whose retryability the transport decided.
    pub fn transport(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind: FetchErrorKind::Network,
            message: message.into(),
            retryable,
        }
    }

    /// 429 and 5xx are retryable, every other status is final.
    pub fn http_status(code: u16) -> Self {
        Self {
            kind: FetchErrorKind::HttpStatus { code },
            message: format!("upstream returned status {code}"),
            retryable: code == 429 || (500..=599).contains(&code),
        }
    }

    pub fn json_parse(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::JsonParse,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn path_extraction(segment: impl Into<String>) -> Self {
        let segment = segment.into();
        Self {
            message: format!("root path segment '{segment}' was not found"),
            kind: FetchErrorKind::PathExtraction { segment },
            retryable: false,
        }
    }

    pub fn paginated_api(failure: PaginatedApiFailure, message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::PaginatedApi(failure),
            message: message.into(),
            retryable: failure.retryable(),
        }
    }

    pub fn invalid_source(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::InvalidSource,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn local_file(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::LocalFile,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn csv_parse(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::CsvParse,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn caller_rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::CallerRateLimited,
            message: message.into(),
            retryable: true,
        }
    }

    pub const fn kind(&self) -> &FetchErrorKind {
        &self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    /// HTTP status carried by the failure, if any.
    pub const fn status(&self) -> Option<u16> {
        match self.kind {
            FetchErrorKind::HttpStatus { code } => Some(code),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match &self.kind {
            FetchErrorKind::Security => "fetch.security",
            FetchErrorKind::Network => "fetch.network",
            FetchErrorKind::HttpStatus { .. } => "fetch.http_status",
            FetchErrorKind::JsonParse => "fetch.json_parse",
            FetchErrorKind::PathExtraction { .. } => "fetch.path_extraction",
            FetchErrorKind::PaginatedApi(failure) => match failure {
                PaginatedApiFailure::AuthFailed => "paginated_api.auth_failed",
                PaginatedApiFailure::PermissionDenied => "paginated_api.permission_denied",
                PaginatedApiFailure::NotFound => "paginated_api.not_found",
                PaginatedApiFailure::InvalidRequest => "paginated_api.invalid_request",
                PaginatedApiFailure::RateLimited => "paginated_api.rate_limited",
                PaginatedApiFailure::ServerError => "paginated_api.server_error",
            },
            FetchErrorKind::InvalidSource => "fetch.invalid_source",
            FetchErrorKind::LocalFile => "fetch.local_file",
            FetchErrorKind::CsvParse => "fetch.csv_parse",
            FetchErrorKind::CallerRateLimited => "fetch.caller_rate_limited",
        }
    }

    /// Caller-safe text. Never contains hosts, URLs, tokens or upstream bodies.
    pub fn public_message(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::CallerRateLimited => {
                "Too many data requests. Please wait a moment and try again."
            }
            FetchErrorKind::InvalidSource => "The data source is not valid.",
            _ => "Unable to load data from the configured source.",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for FetchError {}

impl From<ValidationError> for FetchError {
    fn from(error: ValidationError) -> Self {
        Self::invalid_source(error.to_string())
    }
}

/// Future returned by adapter fetches.
pub type AdapterFuture<'a> = Pin<Box<dyn Future<Output = Result<Dataset, FetchError>> + Send + 'a>>;

/// Source adapter contract.
///
/// Implementations turn one family of [`SourceDescriptor`] into a [`Dataset`]. A
/// descriptor of another family must be answered with
/// [`FetchError::invalid_source`], never a panic.
///
/// `root` is only meaningful to JSON-shaped families; CSV adapters ignore it.
pub trait SourceAdapter: Send + Sync {
    fn family(&self) -> SourceFamily;

    fn fetch<'a>(
        &'a self,
        descriptor: &'a SourceDescriptor,
        root: Option<&'a RootPath>,
    ) -> AdapterFuture<'a>;
}
