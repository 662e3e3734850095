//! Diagnostics sink injected into the request engine, adapters and fetcher.
//!
//! Failure detail (upstream messages, hosts, attempt counts) only leaves the crate
//! through a [`Diagnostics`] implementation. Returned errors carry a caller-safe
//! summary via [`FetchError::public_message`](crate::FetchError::public_message).

use std::sync::Mutex;

use crate::data_source::{FetchError, SourceFamily};

/// Something worth telling an operator about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    TargetBlocked {
        host: String,
    },
    AttemptFailed {
        host: String,
        attempt: u32,
        error: FetchError,
    },
    RequestFailed {
        host: String,
        attempts: u32,
        error: FetchError,
    },
    AdapterFailed {
        family: SourceFamily,
        error: FetchError,
    },
    CacheWriteFailed {
        key: String,
        reason: String,
    },
    CallerLimited {
        caller: String,
    },
}

/// Receiver for diagnostic events.
pub trait Diagnostics: Send + Sync {
    fn record(&self, event: DiagnosticEvent);
}

/// Default sink emitting `tracing` events.
///
/// Blocked targets are always logged by host. Everything else is logged in full only
/// when `verbose` is set; otherwise a debug line carries just the error code.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics {
    verbose: bool,
}

impl TracingDiagnostics {
    pub const fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Diagnostics for TracingDiagnostics {
    fn record(&self, event: DiagnosticEvent) {
        match event {
            DiagnosticEvent::TargetBlocked { host } => {
                tracing::warn!(host = %host, "request target blocked");
            }
            DiagnosticEvent::CallerLimited { caller } => {
                tracing::info!(caller = %caller, "caller rate limited");
            }
            DiagnosticEvent::CacheWriteFailed { key, reason } => {
                tracing::warn!(key = %key, reason = %reason, "cache write failed; serving uncached");
            }
            DiagnosticEvent::AttemptFailed {
                host,
                attempt,
                error,
            } if self.verbose => {
                tracing::warn!(host = %host, attempt, code = error.code(), error = %error.message(), "request attempt failed");
            }
            DiagnosticEvent::RequestFailed {
                host,
                attempts,
                error,
            } if self.verbose => {
                tracing::error!(host = %host, attempts, code = error.code(), error = %error.message(), "request failed");
            }
            DiagnosticEvent::AdapterFailed { family, error } if self.verbose => {
                tracing::error!(family = %family, code = error.code(), error = %error.message(), "adapter failed");
            }
            DiagnosticEvent::AttemptFailed { error, .. }
            | DiagnosticEvent::RequestFailed { error, .. }
            | DiagnosticEvent::AdapterFailed { error, .. } => {
                tracing::debug!(code = error.code(), "fetch failure");
            }
        }
    }
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events
            .lock()
            .expect("diagnostics lock is not poisoned")
            .clone()
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn record(&self, event: DiagnosticEvent) {
        self.events
            .lock()
            .expect("diagnostics lock is not poisoned")
            .push(event);
    }
}
