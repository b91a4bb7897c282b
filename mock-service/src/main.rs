use metrics_exporter_prometheus::PrometheusBuilder;
use mock_service::MockConfig;
use std::net::SocketAddr;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("mock_service=debug,tower_http=info")),
        )
        .init();

    PrometheusBuilder::new()
        .with_http_listener("0.0.0.0:8002".parse::<SocketAddr>()?)
        .install()?;

    let config = MockConfig {
        fail_first: env_or("MOCK_FAIL_FIRST", 0),
        delay: Duration::from_millis(env_or("MOCK_DELAY_MS", 0)),
        max_tps: std::env::var("MOCK_MAX_TPS").ok().and_then(|v| v.parse().ok()),
    };

    let addr: SocketAddr = "0.0.0.0:3002".parse()?;
    tracing::info!("Mock service listening on {addr} with {config:?}");
    mock_service::run(addr, config).await?;
    Ok(())
}

fn env_or(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
