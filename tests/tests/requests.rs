mod utils;
#[allow(unused)]
use utils::*;

use bakeoff::collect;
use bakeoff_core::{RunKind, Targets};
use mock_service::MockConfig;
use serde_json::json;
use url::Url;

#[tokio::test]
#[ntest::timeout(30_000)]
async fn update_sends_passthrough_fields() {
    let mock = mock(MockConfig::default()).await;
    let config = config(
        &mock,
        RunKind::Update,
        json!({ "id": "42", "name": "X", "stockQuantity": 5, "reqs": 1 }),
    );

    let artifact = collect(config).await.unwrap();
    assert_eq!(artifact.summary.totals.status_2xx, 1);
    assert_eq!(artifact.identity.id.as_deref(), Some("42"));

    let received = mock.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].method, "PATCH");
    assert_eq!(received[0].path, "/api/es/product/42");
    assert_eq!(received[0].body, Some(json!({ "name": "X", "stockQuantity": 5 })));
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn seed_posts_count() {
    let mock = mock(MockConfig::default()).await;
    let config = config(&mock, RunKind::Seed, json!({ "reqs": 2, "count": 30 }));

    let artifact = collect(config).await.unwrap();
    assert_eq!(artifact.summary.totals.status_2xx, 2);
    assert_eq!(artifact.identity.count_per_request, Some(30));
    assert!(mock
        .received()
        .iter()
        .all(|r| r.path == "/api/es/product/seed" && r.body == Some(json!({ "count": 30 }))));
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn bulk_runs_once_against_custom_path() {
    let mock = mock(MockConfig::default()).await;
    let config = config(
        &mock,
        RunKind::Bulk,
        json!({ "percent": "5", "count": 10, "bulk_path": "/bulk-price", "vus": 20 }),
    );

    let artifact = collect(config).await.unwrap();
    assert_eq!(artifact.summary.totals.http_reqs, 1);
    assert_eq!(artifact.identity.path.as_deref(), Some("/bulk-price"));

    let received = mock.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].path, "/bulk-price");
    assert_eq!(received[0].body, Some(json!({ "percent": 5.0, "count": 10 })));
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn query_filters_reach_the_target() {
    let mock = mock(MockConfig::default()).await;
    let config = config(
        &mock,
        RunKind::Query,
        json!({ "reqs": 1, "q": "boots", "sort": "price", "dir": "desc" }),
    );

    collect(config).await.unwrap();
    let received = mock.received();
    assert_eq!(
        received[0].query.as_deref(),
        Some("q=boots&sort=price&dir=desc&page=1&perPage=25")
    );
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn router_mode_sets_host_header() {
    let mock = mock(MockConfig::default()).await;
    let targets = Targets::empty()
        .base("symfony", Url::parse("https://symfony-api.ddev.site").unwrap())
        .router(Url::parse(&mock.base_url()).ok());
    let config = bakeoff_core::resolve(
        RunKind::Query,
        &params(json!({ "backend": "symfony", "reqs": 1 })),
        &targets,
    )
    .unwrap()
    .config;

    let artifact = collect(config).await.unwrap();
    assert_eq!(artifact.summary.totals.status_2xx, 1);
    assert_eq!(
        mock.received()[0].host.as_deref(),
        Some("symfony-api.ddev.site")
    );
}
