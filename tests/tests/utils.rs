use bakeoff_core::{resolve, Params, RunConfig, RunKind, Targets};
use mock_service::{MockConfig, MockHandle};
use serde_json::Value;
use std::sync::OnceLock;
use tracing::error;
use tracing_subscriber::FmtSubscriber;
use url::Url;

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let _ = FmtSubscriber::builder()
            .with_env_filter("bakeoff=debug,mock_service=debug")
            .with_test_writer()
            .try_init();
    });
}

#[allow(unused)]
pub async fn mock(config: MockConfig) -> MockHandle {
    init();
    mock_service::spawn(config).await.unwrap()
}

#[allow(unused)]
pub fn targets(mock: &MockHandle) -> Targets {
    Targets::empty().base("pimcore", Url::parse(&mock.base_url()).unwrap())
}

#[allow(unused)]
pub fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

/// Resolves a run against the mock, the way a caller would.
#[allow(unused)]
pub fn config(mock: &MockHandle, kind: RunKind, value: Value) -> RunConfig {
    resolve(kind, &params(value), &targets(mock)).unwrap().config
}
