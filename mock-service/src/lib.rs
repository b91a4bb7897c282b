//! A stand-in product API with the routes a load run calls.
//!
//! Failures, latency and rate limiting are configurable per instance, and every
//! request is recorded so tests can assert on what was actually sent.
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
    Json, Router,
};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
#[allow(unused)]
use metrics::{counter, gauge, histogram};
use rand_distr::{Distribution, Normal};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::debug;

#[derive(Clone, Debug, Default)]
pub struct MockConfig {
    /// The first `fail_first` requests answer 500.
    pub fail_first: u64,
    /// Added to every request before answering.
    pub delay: Duration,
    /// Requests over this rate answer 429.
    pub max_tps: Option<u32>,
}

/// One request as the mock saw it.
#[derive(Clone, Debug, PartialEq)]
pub struct Received {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub host: Option<String>,
    pub body: Option<Value>,
}

#[derive(Clone)]
struct MockState {
    config: Arc<MockConfig>,
    hits: Arc<AtomicU64>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    received: Arc<Mutex<Vec<Received>>>,
}

impl MockState {
    /// Records the request and decides whether it is answered normally.
    async fn admit(
        &self,
        method: Method,
        uri: &Uri,
        headers: &HeaderMap,
        body: &Bytes,
    ) -> Result<(), StatusCode> {
        counter!("mock-service.requests").increment(1);
        let hit = self.hits.fetch_add(1, Ordering::SeqCst) + 1;

        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Received {
                method,
                path: uri.path().to_string(),
                query: uri.query().map(str::to_string),
                host: headers
                    .get(header::HOST)
                    .and_then(|h| h.to_str().ok())
                    .map(str::to_string),
                body: serde_json::from_slice(body).ok(),
            });

        if !self.config.delay.is_zero() {
            tokio::time::sleep(self.config.delay).await;
        }

        if hit <= self.config.fail_first {
            debug!("Failing request #{hit}");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }

        if let Some(limiter) = &self.limiter {
            if limiter.check().is_err() {
                return Err(StatusCode::TOO_MANY_REQUESTS);
            }
        }

        Ok(())
    }
}

pub struct MockHandle {
    pub addr: SocketAddr,
    state: MockState,
}

impl MockHandle {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> u64 {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Received> {
        self.state
            .received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Serves a fresh mock on an ephemeral localhost port.
pub async fn spawn(config: MockConfig) -> std::io::Result<MockHandle> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = state(config);
    let app = router(state.clone());

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!("Mock service stopped: {err}");
        }
    });

    Ok(MockHandle { addr, state })
}

pub async fn run(addr: SocketAddr, config: MockConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state(config))).await
}

fn state(config: MockConfig) -> MockState {
    MockState {
        limiter: config.max_tps.map(|tps| Arc::new(rate_limiter(tps))),
        config: Arc::new(config),
        hits: Arc::new(AtomicU64::new(0)),
        received: Arc::new(Mutex::new(vec![])),
    }
}

fn router(state: MockState) -> Router {
    Router::new()
        .route("/api/:engine/product", get(products))
        .route("/api/:engine/product/seed", post(seed))
        .route("/api/:engine/product/:id", patch(update))
        .route("/api/:engine/bulk-price", post(bulk))
        .route("/bulk-price", post(bulk_default))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn products(
    State(state): State<MockState>,
    Path(engine): Path<String>,
    Query(filters): Query<HashMap<String, String>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if let Err(status) = state.admit(method, &uri, &headers, &Bytes::new()).await {
        return failure(status);
    }

    let per_page: usize = filters
        .get("perPage")
        .and_then(|p| p.parse().ok())
        .unwrap_or(25)
        .min(50);
    let items: Vec<Value> = (0..per_page)
        .map(|i| json!({ "id": i + 1, "name": format!("Product {}", i + 1), "price": 9.99 }))
        .collect();

    let mut response = Json(json!({ "items": items, "total": items.len() })).into_response();
    response
        .headers_mut()
        .insert("server-timing", server_timing(&engine));
    response
}

async fn seed(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(status) = state.admit(method, &uri, &headers, &body).await {
        return failure(status);
    }
    let count = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|b| b["count"].as_u64())
        .unwrap_or(0);
    (StatusCode::CREATED, Json(json!({ "created": count }))).into_response()
}

async fn update(
    State(state): State<MockState>,
    Path((_engine, id)): Path<(String, String)>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(status) = state.admit(method, &uri, &headers, &body).await {
        return failure(status);
    }
    Json(json!({ "id": id, "updated": true })).into_response()
}

async fn bulk(
    State(state): State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(status) = state.admit(method, &uri, &headers, &body).await {
        return failure(status);
    }
    Json(json!({ "updated": true })).into_response()
}

async fn bulk_default(
    state: State<MockState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    bulk(state, method, uri, headers, body).await
}

fn failure(status: StatusCode) -> Response {
    (status, Json(json!({ "error": status.canonical_reason() }))).into_response()
}

/// Randomized application and storage timings, the storage one named after the engine.
fn server_timing(engine: &str) -> HeaderValue {
    let mut rng = rand::thread_rng();
    let app = Normal::<f64>::new(8., 2.).map_or(8., |n| n.sample(&mut rng)).max(0.1);
    let store = Normal::<f64>::new(3., 1.).map_or(3., |n| n.sample(&mut rng)).max(0.1);
    let store_name = if engine == "sql" { "db" } else { "es" };

    HeaderValue::from_str(&format!("app;dur={app:.2}, {store_name};dur={store:.2}"))
        .unwrap_or_else(|_| HeaderValue::from_static("app;dur=8"))
}

pub fn rate_limiter(tps: u32) -> DefaultDirectRateLimiter {
    let tps = NonZeroU32::new(tps).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_second(tps))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_timing_names_storage_by_engine() {
        let es = server_timing("es");
        assert!(es.to_str().unwrap().contains("es;dur="));
        let sql = server_timing("sql");
        assert!(sql.to_str().unwrap().contains("db;dur="));
    }

    #[test]
    fn server_timing_durations_stay_positive() {
        for _ in 0..200 {
            let header = server_timing("es");
            for part in header.to_str().unwrap().split(", ") {
                let dur: f64 = part.split("dur=").nth(1).unwrap().parse().unwrap();
                assert!(dur >= 0.1, "{part}");
            }
        }
    }
}
