use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// HTTP status family of a call. Every call lands in exactly one class; transport
/// errors (status `0`) and anything outside 2xx-4xx count as 5xx.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Success,
    Redirect,
    ClientError,
    ServerError,
}

impl StatusClass {
    pub fn of(status: u16) -> Self {
        match status {
            200..=299 => StatusClass::Success,
            300..=399 => StatusClass::Redirect,
            400..=499 => StatusClass::ClientError,
            _ => StatusClass::ServerError,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StatusClass::Success => "2xx",
            StatusClass::Redirect => "3xx",
            StatusClass::ClientError => "4xx",
            StatusClass::ServerError => "5xx",
        }
    }
}

/// A call counts as successful when its status is in `[200, 400)`.
pub fn is_success(status: u16) -> bool {
    (200..400).contains(&status)
}

/// Per-phase durations in milliseconds. A phase the client could not observe is
/// `None` and is left out of that phase's average.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseTimings {
    pub sending: Option<f64>,
    pub waiting: Option<f64>,
    pub receiving: Option<f64>,
    pub blocked: Option<f64>,
    pub connecting: Option<f64>,
    pub tls_handshaking: Option<f64>,
}

/// One HTTP call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestSample {
    pub status: u16,
    pub duration_ms: f64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub phases: PhaseTimings,
    /// Named `Server-Timing` components reported by the target.
    pub server_timing: BTreeMap<String, f64>,
    /// Build + call + record, plus the configured sleep that follows.
    pub iteration_ms: Option<f64>,
    pub success: bool,
}

impl RequestSample {
    pub fn new(status: u16, duration_ms: f64) -> Self {
        Self {
            status,
            duration_ms,
            bytes_received: 0,
            bytes_sent: 0,
            phases: PhaseTimings::default(),
            server_timing: BTreeMap::new(),
            iteration_ms: None,
            success: is_success(status),
        }
    }

    pub fn class(&self) -> StatusClass {
        StatusClass::of(self.status)
    }
}

/// Truncated snapshot of a call, captured for debugging.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DebugSample {
    pub status: u16,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub snippet: String,
}
