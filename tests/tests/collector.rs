mod utils;
#[allow(unused)]
use utils::*;

use bakeoff::collect;
use bakeoff_core::RunKind;
use mock_service::MockConfig;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
#[ntest::timeout(30_000)]
async fn fixed_requests_all_succeed() {
    let mock = mock(MockConfig::default()).await;
    let config = config(&mock, RunKind::Query, json!({ "reqs": 5, "debug": 1 }));

    let artifact = collect(config).await.unwrap();
    let totals = &artifact.summary.totals;
    assert_eq!(totals.http_reqs, 5);
    assert_eq!(totals.status_2xx, 5);
    assert_eq!(totals.http_req_failed, 0.);
    assert!(artifact.summary.samples.is_empty());
    assert_eq!(artifact.identity.vus, 5);
    assert_eq!(artifact.identity.iterations, Some(5));
    assert_eq!(mock.hits(), 5);

    let latency = &artifact.summary.latency_ms;
    assert!(latency.p95.unwrap() >= latency.p50.unwrap());
    assert!(artifact.summary.thresholds.passed);
    assert!(artifact.summary.throughput.avg_bytes_per_req.unwrap() > 0.);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn failures_are_counted_and_sampled() {
    let mock = mock(MockConfig {
        fail_first: 3,
        ..Default::default()
    })
    .await;
    let config = config(
        &mock,
        RunKind::Query,
        json!({ "reqs": 10, "debug": "1", "sample_mode": "fail", "fail_sample": 5 }),
    );

    let artifact = collect(config).await.unwrap();
    let summary = &artifact.summary;
    assert_eq!(summary.totals.http_reqs, 10);
    assert_eq!(summary.totals.status_5xx, 3);
    assert_eq!(summary.totals.status_2xx, 7);
    assert!((summary.totals.http_req_failed - 0.3).abs() < 1e-9);
    assert_eq!(summary.samples.len(), 3);
    assert!(summary.samples.iter().all(|s| s.status == 500));
    assert!(summary.samples[0].url.contains("/api/es/product"));
    assert!(!summary.thresholds.failure_rate_ok);
    assert!(summary.thresholds.crossed());
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn debug_capture_respects_cap_and_body_limit() {
    let mock = mock(MockConfig {
        fail_first: 20,
        ..Default::default()
    })
    .await;
    let config = config(
        &mock,
        RunKind::Seed,
        json!({ "reqs": 20, "debug": "yes", "sample_mode": "all", "fail_sample": 4, "max_body": 8 }),
    );

    let artifact = collect(config).await.unwrap();
    let samples = &artifact.summary.samples;
    assert_eq!(samples.len(), 4);
    assert!(samples.iter().all(|s| s.snippet.chars().count() <= 8));
    assert!(samples
        .iter()
        .all(|s| s.headers.get("content-type").map(String::as_str) == Some("application/json")));
}

#[tokio::test]
#[ntest::timeout(60_000)]
async fn duration_bounded_run_estimates_rps() {
    let mock = mock(MockConfig::default()).await;
    let config = config(
        &mock,
        RunKind::Query,
        json!({ "vus": 2, "duration": "1s", "sleep": 0.05 }),
    );

    let artifact = collect(config).await.unwrap();
    let summary = &artifact.summary;
    let reqs = summary.totals.http_reqs;
    assert!(reqs >= 2);
    assert_eq!(summary.throughput.est_rps, Some(reqs as f64));
    assert_eq!(artifact.identity.duration.as_deref(), Some("1s"));
    assert_eq!(artifact.identity.iterations, None);

    let iteration = &summary.iteration_duration_ms;
    assert!(iteration.min.unwrap() <= iteration.max.unwrap());
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn server_timing_is_aggregated_per_name() {
    let mock = mock(MockConfig::default()).await;
    let config = config(&mock, RunKind::Query, json!({ "reqs": 4, "engine": "sql" }));

    let artifact = collect(config).await.unwrap();
    let timing = &artifact.summary.server_timing_ms;
    assert_eq!(timing.keys().collect::<Vec<_>>(), ["app", "db"]);
    assert!(timing["app"].avg > 0.);
    assert!(artifact.summary.latency_breakdown_ms.waiting.is_some());
    assert_eq!(artifact.summary.connection_ms.connecting, None);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn rate_limited_calls_are_client_errors() {
    let mock = mock(MockConfig {
        max_tps: Some(1),
        delay: Duration::from_millis(5),
        ..Default::default()
    })
    .await;
    let config = config(&mock, RunKind::Query, json!({ "reqs": 6 }));

    let artifact = collect(config).await.unwrap();
    let totals = &artifact.summary.totals;
    assert_eq!(totals.http_reqs, 6);
    assert!(totals.status_4xx >= 1);
    assert_eq!(totals.status_sum(), 6);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn unreachable_target_counts_as_server_errors() {
    let mock = mock(MockConfig::default()).await;
    let mut config = config(&mock, RunKind::Query, json!({ "reqs": 2 }));
    config.target.base = url::Url::parse("http://127.0.0.1:1").unwrap();

    let artifact = collect(config).await.unwrap();
    assert_eq!(artifact.summary.totals.status_5xx, 2);
    assert_eq!(artifact.summary.totals.http_req_failed, 1.);
    assert_eq!(artifact.summary.totals.data_received, 0);
}
