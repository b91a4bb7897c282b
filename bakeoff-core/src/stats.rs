use crate::config::{Engine, RunConfig, RunKind, RunParams};
use crate::data::DebugSample;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub http_reqs: u64,
    /// Fraction of calls outside `[200, 400)`.
    pub http_req_failed: f64,
    pub data_received: u64,
    pub data_sent: u64,
    pub status_2xx: u64,
    pub status_3xx: u64,
    pub status_4xx: u64,
    pub status_5xx: u64,
}

impl Totals {
    pub fn status_sum(&self) -> u64 {
        self.status_2xx + self.status_3xx + self.status_4xx + self.status_5xx
    }
}

/// Call duration distribution in milliseconds. `None` means "no data", which is
/// not the same thing as a zero latency.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p95: Option<f64>,
    pub p99: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyBreakdown {
    pub sending: Option<f64>,
    /// Roughly the server's share of a call.
    pub waiting: Option<f64>,
    pub receiving: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStats {
    pub blocked: Option<f64>,
    pub connecting: Option<f64>,
    pub tls_handshaking: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationStats {
    pub avg: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Throughput {
    /// Requests per second; only set for duration-bounded runs.
    pub est_rps: Option<f64>,
    pub avg_bytes_per_req: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimingStats {
    pub avg: f64,
    pub p95: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdReport {
    pub enforced: bool,
    pub p95_limit_ms: f64,
    pub max_failure_rate: f64,
    pub p95_ok: bool,
    pub failure_rate_ok: bool,
    pub passed: bool,
}

impl ThresholdReport {
    /// Enforced thresholds that were crossed.
    pub fn crossed(&self) -> bool {
        self.enforced && !self.passed
    }
}

/// Normalized result of one run, computed once from every collected sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSummary {
    pub totals: Totals,
    pub latency_ms: LatencyStats,
    pub latency_breakdown_ms: LatencyBreakdown,
    pub connection_ms: ConnectionStats,
    pub iteration_duration_ms: IterationStats,
    pub throughput: Throughput,
    pub server_timing_ms: BTreeMap<String, TimingStats>,
    pub thresholds: ThresholdReport,
    pub samples: Vec<DebugSample>,
}

/// Which run produced a summary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunIdentity {
    pub kind: RunKind,
    pub backend: String,
    pub engine: Engine,
    pub vus: u64,
    pub iterations: Option<u64>,
    /// Configured duration in human form (`30s`), absent in fixed-request mode.
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count_per_request: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl RunIdentity {
    pub fn of(config: &RunConfig) -> Self {
        let mut identity = Self {
            kind: config.kind(),
            backend: config.backend.clone(),
            engine: config.engine,
            vus: config.concurrency.vus(),
            iterations: config.concurrency.iterations(),
            duration: config
                .concurrency
                .duration()
                .map(|d| humantime::format_duration(d).to_string()),
            id: None,
            count_per_request: None,
            percent: None,
            count: None,
            path: None,
        };

        match &config.params {
            RunParams::Query(_) => {}
            RunParams::Seed { count } => identity.count_per_request = Some(*count),
            RunParams::Update { id, .. } => identity.id = Some(id.clone()),
            RunParams::Bulk { percent, count, .. } => {
                identity.percent = Some(*percent);
                identity.count = *count;
                identity.path = config.bulk_path();
            }
        }

        identity
    }
}

/// The persisted document: run identity and summary side by side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunArtifact {
    #[serde(flatten)]
    pub identity: RunIdentity,
    #[serde(flatten)]
    pub summary: AggregatedSummary,
}
