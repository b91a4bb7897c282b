use std::time::Duration;

/// Backend targeted when the caller does not pick one.
pub const DEFAULT_BACKEND: &str = "pimcore";

pub const DEFAULT_PIMCORE_BASE: &str = "https://pimcore-api.ddev.site";
pub const DEFAULT_SYMFONY_BASE: &str = "https://symfony-api.ddev.site";

/// Router address used when requests are routed through a shared reverse proxy.
pub const DEFAULT_ROUTER_BASE: &str = "http://ddev-router";

/// Artifact file name inside a run's working directory.
pub const ARTIFACT_FILE_NAME: &str = "summary.json";

/// Serialized `RunConfig` handed to the collector process.
pub const RUN_CONFIG_FILE_NAME: &str = "run-config.json";

/// Characters kept from the end of the collector's stdout/stderr on failure.
pub const OUTPUT_TAIL_CHARS: usize = 4000;

/// Characters of an unparseable artifact echoed back to the caller.
pub const ARTIFACT_PREVIEW_CHARS: usize = 1000;

/// Exit code of the collector when enforced thresholds were crossed.
pub const THRESHOLDS_CROSSED_EXIT_CODE: i32 = 99;

/// Window given to in-flight calls once a duration-bounded run hits its deadline.
pub const GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// Headroom over duration plus graceful stop for process startup and aggregation.
pub const STARTUP_MARGIN: Duration = Duration::from_secs(30);

/// Per-call timeout of the HTTP client.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_SAMPLE_CAP: usize = 5;
pub const DEFAULT_MAX_BODY: usize = 1000;

/// Wall-clock budget for read-only query runs.
pub const QUERY_RUN_TIMEOUT: Duration = Duration::from_secs(300);

/// Wall-clock budget for write-heavy seed/update runs.
pub const WRITE_RUN_TIMEOUT: Duration = Duration::from_secs(600);

/// Wall-clock budget for bulk price runs.
pub const BULK_RUN_TIMEOUT: Duration = Duration::from_secs(300);

/// p95 latency goal (ms) and maximum failure rate for query runs.
pub const QUERY_P95_LIMIT_MS: f64 = 2000.;
pub const QUERY_MAX_FAILURE_RATE: f64 = 0.01;

/// p95 latency goal (ms) and maximum failure rate for seed/update/bulk runs.
pub const WRITE_P95_LIMIT_MS: f64 = 5000.;
pub const WRITE_MAX_FAILURE_RATE: f64 = 0.05;
