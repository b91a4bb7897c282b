use crate::constants::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{serde_as, DurationSecondsWithFrac};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
#[error("Unknown {what} `{value}`")]
pub struct ParseVariantError {
    what: &'static str,
    value: String,
}

/// The four families of load runs, each with its own request shape and defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Query,
    Seed,
    Update,
    Bulk,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Query => "query",
            RunKind::Seed => "seed",
            RunKind::Update => "update",
            RunKind::Bulk => "bulk",
        }
    }

    /// Query runs never mutate the target.
    pub fn read_only(&self) -> bool {
        matches!(self, RunKind::Query)
    }

    /// Wall-clock budget of the collector process.
    pub fn timeout(&self) -> Duration {
        match self {
            RunKind::Query => QUERY_RUN_TIMEOUT,
            RunKind::Seed | RunKind::Update => WRITE_RUN_TIMEOUT,
            RunKind::Bulk => BULK_RUN_TIMEOUT,
        }
    }

    pub fn thresholds(&self, enforce: bool) -> Thresholds {
        let (p95_ms, max_failure_rate) = if self.read_only() {
            (QUERY_P95_LIMIT_MS, QUERY_MAX_FAILURE_RATE)
        } else {
            (WRITE_P95_LIMIT_MS, WRITE_MAX_FAILURE_RATE)
        };
        Thresholds {
            enforce,
            p95_ms,
            max_failure_rate,
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunKind {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "query" | "run" => Ok(RunKind::Query),
            "seed" => Ok(RunKind::Seed),
            "update" => Ok(RunKind::Update),
            "bulk" | "bulk-price" => Ok(RunKind::Bulk),
            _ => Err(ParseVariantError {
                what: "run kind",
                value: s.to_string(),
            }),
        }
    }
}

/// Internal execution path of the backend (search index or relational store).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Es,
    Sql,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Es => "es",
            Engine::Sql => "sql",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "es" => Ok(Engine::Es),
            "sql" => Ok(Engine::Sql),
            _ => Err(ParseVariantError {
                what: "engine",
                value: s.to_string(),
            }),
        }
    }
}

/// Which call outcomes are eligible for debug capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleMode {
    Fail,
    Success,
    All,
}

impl SampleMode {
    pub fn matches(&self, ok: bool) -> bool {
        match self {
            SampleMode::Fail => !ok,
            SampleMode::Success => ok,
            SampleMode::All => true,
        }
    }
}

impl FromStr for SampleMode {
    type Err = ParseVariantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fail" => Ok(SampleMode::Fail),
            "success" => Ok(SampleMode::Success),
            "all" => Ok(SampleMode::All),
            _ => Err(ParseVariantError {
                what: "sample mode",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DebugConfig {
    pub enabled: bool,
    pub mode: SampleMode,
    pub max_samples: usize,
    pub max_body: usize,
    /// Echo each captured sample through the log as it is taken.
    pub print: bool,
}

impl DebugConfig {
    /// Whether a call with the given outcome is eligible for capture. The cap is
    /// enforced separately by the collector.
    pub fn wants(&self, ok: bool) -> bool {
        self.enabled && self.max_samples > 0 && self.mode.matches(ok)
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: SampleMode::Fail,
            max_samples: DEFAULT_SAMPLE_CAP,
            max_body: DEFAULT_MAX_BODY,
            print: false,
        }
    }
}

/// Pass/fail goals evaluated after aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub enforce: bool,
    pub p95_ms: f64,
    pub max_failure_rate: f64,
}

/// Exactly one of the two modes is ever active for a run.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConcurrencyMode {
    /// `n` virtual callers sharing exactly `n` iterations.
    FixedRequests { n: u64 },
    /// `vus` virtual callers looping until `duration` elapses.
    RateOverTime {
        vus: u64,
        #[serde_as(as = "DurationSecondsWithFrac<f64>")]
        duration: Duration,
    },
}

impl ConcurrencyMode {
    pub fn vus(&self) -> u64 {
        match self {
            ConcurrencyMode::FixedRequests { n } => *n,
            ConcurrencyMode::RateOverTime { vus, .. } => *vus,
        }
    }

    pub fn iterations(&self) -> Option<u64> {
        match self {
            ConcurrencyMode::FixedRequests { n } => Some(*n),
            ConcurrencyMode::RateOverTime { .. } => None,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            ConcurrencyMode::FixedRequests { .. } => None,
            ConcurrencyMode::RateOverTime { duration, .. } => Some(*duration),
        }
    }
}

/// Where requests of a run are sent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub base: Url,
    /// `Host` header override, set when calls go through a shared router.
    pub host: Option<String>,
    pub insecure_tls: bool,
}

/// Known backends and how to reach them.
#[derive(Clone, Debug)]
pub struct Targets {
    bases: BTreeMap<String, Url>,
    router: Option<Url>,
    insecure_tls: bool,
}

impl Default for Targets {
    fn default() -> Self {
        let mut bases = BTreeMap::new();
        for (name, base) in [
            ("pimcore", DEFAULT_PIMCORE_BASE),
            ("symfony", DEFAULT_SYMFONY_BASE),
        ] {
            if let Ok(url) = Url::parse(base) {
                bases.insert(name.to_string(), url);
            }
        }
        Self {
            bases,
            router: None,
            insecure_tls: false,
        }
    }
}

impl Targets {
    pub fn empty() -> Self {
        Self {
            bases: BTreeMap::new(),
            router: None,
            insecure_tls: false,
        }
    }

    pub fn base(mut self, backend: &str, url: Url) -> Self {
        self.bases.insert(backend.to_ascii_lowercase(), url);
        self
    }

    pub fn router(mut self, router: Option<Url>) -> Self {
        self.router = router;
        self
    }

    pub fn insecure_tls(mut self, insecure_tls: bool) -> Self {
        self.insecure_tls = insecure_tls;
        self
    }

    pub fn backends(&self) -> impl Iterator<Item = &str> {
        self.bases.keys().map(String::as_str)
    }

    pub fn resolve(&self, backend: &str) -> Option<Target> {
        let base = self.bases.get(backend)?;
        let target = match &self.router {
            Some(router) => Target {
                base: router.clone(),
                host: base.host_str().map(str::to_string),
                insecure_tls: self.insecure_tls,
            },
            None => Target {
                base: base.clone(),
                host: None,
                insecure_tls: self.insecure_tls,
            },
        };
        Some(target)
    }
}

/// Product search filters, forwarded as query-string values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub brand_id: Option<String>,
    pub category_id: Option<String>,
    pub q: Option<String>,
    pub price_min: Option<String>,
    pub price_max: Option<String>,
    pub stock_min: Option<String>,
    pub stock_max: Option<String>,
    pub sort: Option<String>,
    pub dir: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
}

impl QueryParams {
    /// Non-empty filters in wire order.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("brandId", &self.brand_id),
            ("categoryId", &self.category_id),
            ("q", &self.q),
            ("priceMin", &self.price_min),
            ("priceMax", &self.price_max),
            ("stockMin", &self.stock_min),
            ("stockMax", &self.stock_max),
            ("sort", &self.sort),
            ("dir", &self.dir),
            ("page", &self.page),
            ("perPage", &self.per_page),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(|v| (key, v))
        })
        .collect()
    }
}

/// Update request body, decided once at resolution time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum UpdatePayload {
    ExplicitBody(Value),
    InferredFromPassthrough(Map<String, Value>),
}

impl UpdatePayload {
    pub fn body(&self) -> Value {
        match self {
            UpdatePayload::ExplicitBody(value) => value.clone(),
            UpdatePayload::InferredFromPassthrough(fields) => Value::Object(fields.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RunParams {
    Query(QueryParams),
    Seed {
        count: u64,
    },
    Update {
        id: String,
        payload: UpdatePayload,
    },
    Bulk {
        percent: f64,
        count: Option<u64>,
        path: Option<String>,
    },
}

impl RunParams {
    pub fn kind(&self) -> RunKind {
        match self {
            RunParams::Query(_) => RunKind::Query,
            RunParams::Seed { .. } => RunKind::Seed,
            RunParams::Update { .. } => RunKind::Update,
            RunParams::Bulk { .. } => RunKind::Bulk,
        }
    }
}

/// Bulk endpoint used when the caller does not override it.
pub fn default_bulk_path(engine: Engine) -> String {
    format!("/api/{engine}/bulk-price")
}

/// Fully resolved, typed configuration of a single run.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub backend: String,
    pub engine: Engine,
    pub target: Target,
    pub concurrency: ConcurrencyMode,
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub sleep: Duration,
    pub thresholds: Thresholds,
    pub debug: DebugConfig,
    pub params: RunParams,
}

impl RunConfig {
    pub fn kind(&self) -> RunKind {
        self.params.kind()
    }

    /// Wall-clock budget of the collector process: the kind's budget, stretched
    /// to cover a configured duration plus its graceful stop.
    pub fn process_timeout(&self) -> Duration {
        let budget = self.kind().timeout();
        match self.concurrency.duration() {
            Some(duration) => budget.max(duration + GRACEFUL_STOP + STARTUP_MARGIN),
            None => budget,
        }
    }

    /// Bulk endpoint path, normalized to start with `/`.
    pub fn bulk_path(&self) -> Option<String> {
        match &self.params {
            RunParams::Bulk { path, .. } => {
                let path = path
                    .clone()
                    .unwrap_or_else(|| default_bulk_path(self.engine));
                if path.starts_with('/') {
                    Some(path)
                } else {
                    Some(format!("/{path}"))
                }
            }
            _ => None,
        }
    }
}
