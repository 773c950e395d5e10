//! Probe module for URL availability checks.
//!
//! A probe is one timed GET. Failures are folded into the outcome instead of
//! being returned, so a dead endpoint only ever produces failure samples.

mod http;

pub use http::*;

use std::time::Duration;
use thiserror::Error;

/// Fixed upper bound for a single probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Probe error types.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("probe timed out after {0:?}")]
    Timeout(Duration),
    #[error("network error: {0}")]
    Network(String),
    #[error("failed to build http client: {0}")]
    Client(String),
}

/// Result of one probe attempt.
///
/// `status` is `None` when no response was received at all. A response with
/// an error status (4xx/5xx) still carries its code and measured latency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeOutcome {
    pub latency: Duration,
    pub status: Option<u16>,
}

impl ProbeOutcome {
    pub fn failed() -> Self {
        Self {
            latency: Duration::ZERO,
            status: None,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.status.is_some()
    }

    pub fn status_name(&self) -> &'static str {
        status_name(self.status)
    }
}

/// Map a status code to its display name.
pub fn status_name(status: Option<u16>) -> &'static str {
    let Some(code) = status else {
        return "Request Failed";
    };

    match code {
        100 => "Continue",
        200 => "OK",
        201 => "Created",
        301 => "Moved Permanently",
        302 => "Found",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
