//! Turns loosely typed caller parameters into a [`RunConfig`].
//!
//! Each run kind has a whitelist of recognized keys with defaults. Values are
//! first flattened into a string view (what the caller effectively asked for,
//! reported back as the invocation arguments), then parsed once into typed
//! fields. Unknown keys are dropped, except that update runs without an explicit
//! `body` forward them as the update payload.
use crate::config::*;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
#[allow(unused_imports)]
use tracing::{debug, trace};

/// Caller-supplied key/value pairs.
pub type Params = Map<String, Value>;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Missing required parameter: {0}")]
    Missing(&'static str),

    #[error("Invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("Unknown backend `{0}`")]
    UnknownBackend(String),
}

/// Output of the resolver: the typed configuration and the effective arguments.
#[derive(Clone, Debug)]
pub struct Resolved {
    pub config: RunConfig,
    pub args: BTreeMap<String, String>,
}

struct Param {
    key: &'static str,
    default: Option<&'static str>,
}

const fn param(key: &'static str, default: Option<&'static str>) -> Param {
    Param { key, default }
}

const QUERY_PARAMS: &[Param] = &[
    param("brandId", None),
    param("categoryId", None),
    param("q", None),
    param("priceMin", None),
    param("priceMax", None),
    param("stockMin", None),
    param("stockMax", None),
    param("sort", Some("name")),
    param("dir", Some("asc")),
    param("page", Some("1")),
    param("perPage", Some("25")),
];

const SEED_PARAMS: &[Param] = &[param("count", Some("100"))];

const UPDATE_PARAMS: &[Param] = &[param("id", None)];

const BULK_PARAMS: &[Param] = &[
    param("percent", None),
    param("count", None),
    param("bulk_path", None),
];

/// Defaults shared by every kind, with the per-kind knobs filled in.
fn common_params(kind: RunKind) -> Vec<Param> {
    let (vus, duration, sleep, no_thresh, reqs) = match kind {
        RunKind::Query => ("50", "30s", "0.2", "0", None),
        RunKind::Seed | RunKind::Update => ("10", "10s", "0", "1", None),
        RunKind::Bulk => ("10", "10s", "0.1", "1", Some("1")),
    };

    vec![
        param("backend", Some(crate::DEFAULT_BACKEND)),
        param("engine", Some("es")),
        param("reqs", reqs),
        param("no_thresh", Some(no_thresh)),
        param("vus", Some(vus)),
        param("duration", Some(duration)),
        param("sleep", Some(sleep)),
        param("debug", Some("0")),
        param("sample_mode", Some("fail")),
        param("fail_sample", Some("5")),
        param("print_samples", Some("0")),
        param("max_body", Some("1000")),
    ]
}

fn whitelist(kind: RunKind) -> Vec<Param> {
    let mut params = common_params(kind);
    let specific = match kind {
        RunKind::Query => QUERY_PARAMS,
        RunKind::Seed => SEED_PARAMS,
        RunKind::Update => UPDATE_PARAMS,
        RunKind::Bulk => BULK_PARAMS,
    };
    params.extend(specific.iter().map(|p| param(p.key, p.default)));
    params
}

/// Scalars become their text form, nested values their JSON encoding. `null` and
/// `""` count as "not supplied".
fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        Value::Number(n) => Some(n.to_string()),
        nested => Some(nested.to_string()),
    }
}

fn is_blank(value: &Value) -> bool {
    text_of(value).is_none()
}

/// Resolve the parameters of a run of the given kind.
pub fn resolve(kind: RunKind, params: &Params, targets: &Targets) -> Result<Resolved, ResolveError> {
    let whitelist = whitelist(kind);

    let mut args = BTreeMap::new();
    for p in &whitelist {
        let supplied = params.get(p.key).and_then(text_of);
        if let Some(value) = supplied.or_else(|| p.default.map(str::to_string)) {
            args.insert(p.key.to_string(), value);
        }
    }
    trace!("Resolved arguments: {args:?}");

    let view = Args(&args);

    let backend = view.required("backend")?.to_ascii_lowercase();
    let target = targets
        .resolve(&backend)
        .ok_or_else(|| ResolveError::UnknownBackend(backend.clone()))?;
    let engine: Engine = view.parse("engine")?.ok_or(ResolveError::Missing("engine"))?;

    let run_params = match kind {
        RunKind::Query => RunParams::Query(QueryParams {
            brand_id: view.text("brandId"),
            category_id: view.text("categoryId"),
            q: view.text("q"),
            price_min: view.text("priceMin"),
            price_max: view.text("priceMax"),
            stock_min: view.text("stockMin"),
            stock_max: view.text("stockMax"),
            sort: view.text("sort"),
            dir: view.text("dir"),
            page: view.text("page"),
            per_page: view.text("perPage"),
        }),
        RunKind::Seed => {
            let count: u64 = view.parse("count")?.ok_or(ResolveError::Missing("count"))?;
            if count == 0 {
                return Err(ResolveError::Invalid {
                    key: "count",
                    reason: "must be greater than zero".to_string(),
                });
            }
            RunParams::Seed { count }
        }
        RunKind::Update => {
            let id = view.required("id")?.to_string();
            let payload = update_payload(params, &whitelist)?;
            RunParams::Update { id, payload }
        }
        RunKind::Bulk => {
            let percent: f64 = view.parse("percent")?.ok_or(ResolveError::Missing("percent"))?;
            if !percent.is_finite() {
                return Err(ResolveError::Invalid {
                    key: "percent",
                    reason: "must be a finite number".to_string(),
                });
            }
            let count = view.parse::<u64>("count")?.filter(|c| *c > 0);
            RunParams::Bulk {
                percent,
                count,
                path: view.text("bulk_path"),
            }
        }
    };

    let debug = DebugConfig {
        enabled: view.flag("debug")?,
        mode: view.parse("sample_mode")?.unwrap_or(SampleMode::Fail),
        max_samples: view.parse("fail_sample")?.unwrap_or(0),
        max_body: view.parse("max_body")?.unwrap_or(0),
        print: view.flag("print_samples")?,
    };

    let config = RunConfig {
        backend,
        engine,
        target,
        concurrency: concurrency(kind, &view)?,
        sleep: view.seconds("sleep")?,
        thresholds: kind.thresholds(!view.flag("no_thresh")?),
        debug,
        params: run_params,
    };
    debug!("Resolved {kind} run: {config:?}");

    Ok(Resolved { config, args })
}

/// A positive integer `reqs` pins both callers and iterations to that number and
/// drops the duration. Bulk runs are always fixed, with at least one request.
fn concurrency(kind: RunKind, view: &Args) -> Result<ConcurrencyMode, ResolveError> {
    let reqs = view
        .get("reqs")
        .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|v| v.parse::<u64>().ok());

    if kind == RunKind::Bulk {
        return Ok(ConcurrencyMode::FixedRequests {
            n: reqs.unwrap_or(0).max(1),
        });
    }

    match reqs {
        Some(n) if n > 0 => Ok(ConcurrencyMode::FixedRequests { n }),
        _ => {
            let vus: u64 = view.parse("vus")?.ok_or(ResolveError::Missing("vus"))?;
            if vus == 0 {
                return Err(ResolveError::Invalid {
                    key: "vus",
                    reason: "must be greater than zero".to_string(),
                });
            }
            let duration = view.duration("duration")?;
            Ok(ConcurrencyMode::RateOverTime { vus, duration })
        }
    }
}

/// Keys that steer the run and must never end up in an update payload.
fn is_control_key(key: &str, whitelist: &[Param]) -> bool {
    key == "body"
        || whitelist
            .iter()
            .any(|p| p.key == key || p.key.to_ascii_uppercase() == key)
}

fn update_payload(params: &Params, whitelist: &[Param]) -> Result<UpdatePayload, ResolveError> {
    if let Some(body) = params.get("body").filter(|b| !is_blank(b)) {
        let body = match body {
            Value::String(text) => {
                serde_json::from_str(text).map_err(|err| ResolveError::Invalid {
                    key: "body",
                    reason: err.to_string(),
                })?
            }
            other => other.clone(),
        };
        return Ok(UpdatePayload::ExplicitBody(body));
    }

    let fields = params
        .iter()
        .filter(|(key, _)| !is_control_key(key, whitelist))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Ok(UpdatePayload::InferredFromPassthrough(fields))
}

/// Typed access to the resolved string view.
struct Args<'a>(&'a BTreeMap<String, String>);

impl<'a> Args<'a> {
    fn get(&self, key: &str) -> Option<&'a str> {
        self.0.get(key).map(String::as_str)
    }

    fn text(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    fn required(&self, key: &'static str) -> Result<&'a str, ResolveError> {
        self.get(key).ok_or(ResolveError::Missing(key))
    }

    fn parse<T>(&self, key: &'static str) -> Result<Option<T>, ResolveError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|v| {
                v.trim().parse::<T>().map_err(|err| ResolveError::Invalid {
                    key,
                    reason: format!("`{v}`: {err}"),
                })
            })
            .transpose()
    }

    fn flag(&self, key: &'static str) -> Result<bool, ResolveError> {
        match self.get(key).map(|v| v.trim().to_ascii_lowercase()) {
            None => Ok(false),
            Some(v) => match v.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ResolveError::Invalid {
                    key,
                    reason: format!("`{v}` is not a flag"),
                }),
            },
        }
    }

    /// Plain numbers are seconds; anything else goes through `humantime` (`30s`, `1m30s`).
    fn duration(&self, key: &'static str) -> Result<Duration, ResolveError> {
        let raw = self.required(key)?.trim();
        let duration = match raw.parse::<f64>() {
            Ok(secs) => secs_to_duration(key, secs)?,
            Err(_) => humantime::parse_duration(raw).map_err(|err| ResolveError::Invalid {
                key,
                reason: format!("`{raw}`: {err}"),
            })?,
        };
        if duration.is_zero() {
            return Err(ResolveError::Invalid {
                key,
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(duration)
    }

    fn seconds(&self, key: &'static str) -> Result<Duration, ResolveError> {
        match self.parse::<f64>(key)? {
            Some(secs) => secs_to_duration(key, secs),
            None => Ok(Duration::ZERO),
        }
    }
}

fn secs_to_duration(key: &'static str, secs: f64) -> Result<Duration, ResolveError> {
    Duration::try_from_secs_f64(secs).map_err(|err| ResolveError::Invalid {
        key,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;
    use serde_json::json;

    fn params(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => panic!("params must be an object"),
        }
    }

    fn resolve_ok(kind: RunKind, value: Value) -> Resolved {
        resolve(kind, &params(value), &Targets::default()).unwrap()
    }

    #[test]
    fn positive_reqs_pins_vus_and_iterations() {
        for reqs in [json!(1), json!(7), json!("25")] {
            let resolved = resolve_ok(RunKind::Query, json!({ "reqs": reqs, "duration": "1m" }));
            let mode = resolved.config.concurrency;
            assert_eq!(mode.vus(), mode.iterations().unwrap());
            assert_eq!(mode.duration(), None);
        }
    }

    #[test]
    fn zero_or_malformed_reqs_falls_back_to_duration() {
        for reqs in [json!(0), json!("abc"), json!("1.5"), json!(-3)] {
            let resolved = resolve_ok(RunKind::Query, json!({ "reqs": reqs }));
            assert_eq!(
                resolved.config.concurrency,
                ConcurrencyMode::RateOverTime {
                    vus: 50,
                    duration: Duration::from_secs(30)
                }
            );
        }
    }

    #[test]
    fn blank_values_use_defaults() {
        let resolved = resolve_ok(
            RunKind::Seed,
            json!({ "vus": "", "duration": null, "count": "", "sleep": "" }),
        );
        let config = resolved.config;
        assert_eq!(config.concurrency.vus(), 10);
        assert_eq!(config.concurrency.duration(), Some(Duration::from_secs(10)));
        assert_eq!(config.params, RunParams::Seed { count: 100 });
        assert_eq!(config.sleep, Duration::ZERO);
        assert!(!config.thresholds.enforce);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let resolved = resolve_ok(RunKind::Query, json!({ "color": "red", "q": "shoe" }));
        assert!(!resolved.args.contains_key("color"));
        assert_eq!(resolved.args["q"], "shoe");
    }

    #[test]
    fn nested_values_are_encoded_as_json_text() {
        let resolved = resolve_ok(RunKind::Query, json!({ "brandId": [3, 4] }));
        match resolved.config.params {
            RunParams::Query(query) => assert_eq!(query.brand_id.as_deref(), Some("[3,4]")),
            other => panic!("unexpected params {other:?}"),
        }
    }

    #[test]
    fn query_defaults() {
        let config = resolve_ok(RunKind::Query, json!({})).config;
        assert_eq!(config.backend, "pimcore");
        assert_eq!(config.engine, Engine::Es);
        assert_eq!(config.sleep, Duration::from_millis(200));
        assert!(config.thresholds.enforce);
        assert_eq!(config.thresholds.p95_ms, 2000.);
        assert!(!config.debug.enabled);
        assert_eq!(config.debug.mode, SampleMode::Fail);
        assert_eq!(config.debug.max_samples, 5);
        assert_eq!(config.debug.max_body, 1000);
    }

    #[test]
    fn update_requires_id() {
        let err = resolve(RunKind::Update, &params(json!({ "name": "x" })), &Targets::default())
            .unwrap_err();
        assert!(matches!(err, ResolveError::Missing("id")));
    }

    #[test]
    fn update_passthrough_excludes_control_keys() {
        let resolved = resolve_ok(
            RunKind::Update,
            json!({
                "id": "42",
                "backend": "symfony",
                "reqs": 3,
                "DEBUG": "1",
                "name": "Blue shoe",
                "stockQuantity": 12,
            }),
        );
        match resolved.config.params {
            RunParams::Update { id, payload } => {
                assert_eq!(id, "42");
                assert_eq!(
                    payload,
                    UpdatePayload::InferredFromPassthrough(params(json!({
                        "name": "Blue shoe",
                        "stockQuantity": 12,
                    })))
                );
            }
            other => panic!("unexpected params {other:?}"),
        }
    }

    #[test]
    fn explicit_update_body_wins() {
        let resolved = resolve_ok(
            RunKind::Update,
            json!({ "id": "7", "body": "{\"price\": 9.5}", "name": "ignored" }),
        );
        match resolved.config.params {
            RunParams::Update { payload, .. } => {
                assert_eq!(payload, UpdatePayload::ExplicitBody(json!({ "price": 9.5 })));
            }
            other => panic!("unexpected params {other:?}"),
        }

        let err = resolve(
            RunKind::Update,
            &params(json!({ "id": "7", "body": "{not json" })),
            &Targets::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::Invalid { key: "body", .. }));
    }

    #[test]
    fn bulk_requires_percent_and_is_always_fixed() {
        let err = resolve(RunKind::Bulk, &params(json!({})), &Targets::default()).unwrap_err();
        assert!(matches!(err, ResolveError::Missing("percent")));

        let config = resolve_ok(RunKind::Bulk, json!({ "percent": "-5", "count": 0 })).config;
        assert_eq!(config.concurrency, ConcurrencyMode::FixedRequests { n: 1 });
        assert_eq!(
            config.params,
            RunParams::Bulk {
                percent: -5.,
                count: None,
                path: None
            }
        );
        assert_eq!(config.bulk_path().as_deref(), Some("/api/es/bulk-price"));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let targets = Targets::default();
        for (kind, value) in [
            (RunKind::Query, json!({ "vus": "many" })),
            (RunKind::Query, json!({ "duration": "soon" })),
            (RunKind::Query, json!({ "sample_mode": "some" })),
            (RunKind::Query, json!({ "engine": "mongo" })),
            (RunKind::Query, json!({ "debug": "maybe" })),
            (RunKind::Seed, json!({ "count": 0 })),
            (RunKind::Bulk, json!({ "percent": "ten" })),
        ] {
            assert!(resolve(kind, &params(value), &targets).is_err());
        }

        let err = resolve(RunKind::Query, &params(json!({ "backend": "laravel" })), &targets)
            .unwrap_err();
        assert!(matches!(err, ResolveError::UnknownBackend(b) if b == "laravel"));
    }

    #[test]
    fn flags_accept_booleans_and_digits() {
        let config = resolve_ok(
            RunKind::Query,
            json!({ "debug": true, "no_thresh": "1", "print_samples": "0", "sample_mode": "ALL" }),
        )
        .config;
        assert!(config.debug.enabled);
        assert!(!config.debug.print);
        assert_eq!(config.debug.mode, SampleMode::All);
        assert!(!config.thresholds.enforce);
    }

    #[test]
    fn long_durations_stretch_the_process_budget() {
        let short = resolve_ok(RunKind::Query, json!({ "duration": "30s" })).config;
        assert_eq!(short.process_timeout(), QUERY_RUN_TIMEOUT);

        let long = resolve_ok(RunKind::Query, json!({ "duration": "5m" })).config;
        assert_eq!(
            long.process_timeout(),
            Duration::from_secs(300) + GRACEFUL_STOP + STARTUP_MARGIN
        );

        let fixed = resolve_ok(RunKind::Seed, json!({ "reqs": 3 })).config;
        assert_eq!(fixed.process_timeout(), WRITE_RUN_TIMEOUT);
    }

    #[tracing_test::traced_test]
    #[test]
    fn resolution_is_logged() {
        resolve_ok(RunKind::Seed, json!({ "reqs": 2 }));
        assert!(logs_contain("Resolved seed run"));
    }
}
