//! The collector: runs virtual callers against a target and gathers every call.
//!
//! In fixed-request mode `n` callers share exactly `n` iterations. In
//! duration mode `vus` callers loop until the deadline, after which in-flight
//! calls get a graceful stop window ([`GRACEFUL_STOP`] unless overridden) to
//! finish before being aborted.
use crate::aggregate;
use crate::error::Error;
use crate::request::{builder_for, RequestBuilder};
use crate::transaction::{self, millis};
use bakeoff_core::{
    ConcurrencyMode, DebugSample, RequestSample, RunArtifact, RunConfig, RunIdentity,
    GRACEFUL_STOP, REQUEST_TIMEOUT,
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn, Instrument};

mod task_atomics;

pub use task_atomics::Progress;
use task_atomics::{Budget, TaskAtomics};

/// Everything gathered during one run.
#[derive(Clone, Debug, Default)]
pub struct Collected {
    pub samples: Vec<RequestSample>,
    pub debug_samples: Vec<DebugSample>,
    pub elapsed: Duration,
}

pub struct Collector {
    config: RunConfig,
    builder: Box<dyn RequestBuilder>,
    client: Client,
    graceful_stop: Duration,
    progress: Progress,
}

struct Shared {
    config: RunConfig,
    builder: Box<dyn RequestBuilder>,
    client: Client,
    atomics: TaskAtomics,
}

impl Collector {
    pub fn new(config: RunConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(config.target.insecure_tls)
            .build()?;

        Ok(Self {
            builder: builder_for(config.kind()),
            config,
            client,
            graceful_stop: GRACEFUL_STOP,
            progress: Progress::default(),
        })
    }

    /// Handle on the call counts, updated as the run goes.
    pub fn progress(&self) -> Progress {
        self.progress.clone()
    }

    /// Window given to in-flight calls after a duration-bounded run's deadline.
    pub fn graceful_stop(mut self, window: Duration) -> Self {
        self.graceful_stop = window;
        self
    }

    /// Runs and reduces the result into an artifact.
    pub async fn artifact(self) -> Result<RunArtifact, Error> {
        let config = self.config.clone();
        let identity = RunIdentity::of(&config);
        let collected = self.run().await?;
        let summary = aggregate::summarize(&collected, &config);

        Ok(RunArtifact { identity, summary })
    }

    #[tracing::instrument(name = "collector", skip_all, fields(kind = %self.config.kind(), backend = %self.config.backend))]
    pub async fn run(self) -> Result<Collected, Error> {
        // A config the builder rejects would fail identically on every iteration.
        self.builder.build(&self.config)?;

        let vus = self.config.concurrency.vus();
        let start = Instant::now();
        let (budget, stop_at) = match self.config.concurrency {
            ConcurrencyMode::FixedRequests { n } => (Budget::iterations(n), None),
            ConcurrencyMode::RateOverTime { duration, .. } => {
                let deadline = start + duration;
                (Budget::Deadline(deadline), Some(deadline + self.graceful_stop))
            }
        };

        let shared = Arc::new(Shared {
            config: self.config,
            builder: self.builder,
            client: self.client,
            atomics: TaskAtomics::new(budget, self.progress),
        });

        info!("Starting {vus} virtual callers");
        let mut tasks = JoinSet::new();
        for caller in 0..vus {
            tasks.spawn(virtual_caller(caller, shared.clone()).in_current_span());
        }

        loop {
            let joined = match stop_at {
                Some(at) => match tokio::time::timeout_at(at, tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!(
                            "Graceful stop elapsed, aborting {} virtual callers",
                            tasks.len()
                        );
                        tasks.abort_all();
                        while tasks.join_next().await.is_some() {}
                        break;
                    }
                },
                None => tasks.join_next().await,
            };

            match joined {
                None => break,
                Some(Err(err)) if err.is_panic() => error!("Virtual caller panicked: {err}"),
                Some(_) => {}
            }
        }

        let elapsed = start.elapsed();
        let (samples, debug_samples) = shared.atomics.collect();
        info!("Collected {} samples in {elapsed:?}", samples.len());

        Ok(Collected {
            samples,
            debug_samples,
            elapsed,
        })
    }
}

async fn virtual_caller(caller: u64, shared: Arc<Shared>) {
    let Shared {
        config,
        builder,
        client,
        atomics,
    } = &*shared;

    while atomics.next_iteration() {
        let started = Instant::now();
        let spec = match builder.build(config) {
            Ok(spec) => spec,
            Err(err) => {
                error!("Virtual caller {caller} cannot build its request: {err}");
                break;
            }
        };

        let call = transaction::send(client, spec).await;

        if config.debug.wants(call.sample.success)
            && atomics.reserve_debug_slot(config.debug.max_samples)
        {
            let captured = call.debug_sample(config.debug.max_body);
            if config.debug.print {
                info!(
                    status = captured.status,
                    url = %captured.url,
                    "Debug sample: {}",
                    captured.snippet
                );
            }
            atomics.record_debug(captured);
        }

        let mut sample = call.sample;
        // The configured pause belongs to the iteration it follows.
        sample.iteration_ms = Some(millis(started.elapsed() + config.sleep));
        atomics.record(sample);

        if !config.sleep.is_zero() {
            tokio::time::sleep(config.sleep).await;
        }
    }

    trace!("Virtual caller {caller} done");
}

/// Runs the collector for `config` and reduces the result into an artifact.
pub async fn collect(config: RunConfig) -> Result<RunArtifact, Error> {
    Collector::new(config)?.artifact().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::test_support::{config_with, targets};
    use bakeoff_core::RunKind;
    use mock_service::MockConfig;
    use serde_json::json;

    #[tracing_test::traced_test]
    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn shared_iterations_are_exact() {
        let mock = mock_service::spawn(MockConfig::default()).await.unwrap();
        let config = config_with(
            RunKind::Query,
            json!({ "reqs": 7 }),
            targets(&mock.base_url()),
        );

        let collector = Collector::new(config).unwrap();
        let progress = collector.progress();
        let collected = collector.run().await.unwrap();
        assert_eq!(collected.samples.len(), 7);
        assert_eq!(progress.completed(), 7);
        assert_eq!(mock.hits(), 7);
        assert!(collected.samples.iter().all(|s| s.iteration_ms.is_some()));
        assert!(logs_contain("Starting 7 virtual callers"));
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn printed_samples_go_to_the_log() {
        let mock = mock_service::spawn(MockConfig {
            fail_first: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        let config = config_with(
            RunKind::Seed,
            json!({ "reqs": 1, "debug": 1, "print_samples": 1 }),
            targets(&mock.base_url()),
        );

        let collected = Collector::new(config).unwrap().run().await.unwrap();
        assert_eq!(collected.debug_samples.len(), 1);
        assert!(logs_contain("Debug sample"));
    }

    #[tokio::test]
    #[ntest::timeout(30_000)]
    async fn iteration_time_includes_the_sleep() {
        let mock = mock_service::spawn(MockConfig::default()).await.unwrap();
        let config = config_with(
            RunKind::Query,
            json!({ "reqs": 2, "sleep": 0.2 }),
            targets(&mock.base_url()),
        );

        let collected = Collector::new(config).unwrap().run().await.unwrap();
        assert_eq!(collected.samples.len(), 2);
        for sample in &collected.samples {
            assert!(sample.iteration_ms.unwrap() >= 200.);
            assert!(sample.iteration_ms.unwrap() >= sample.duration_ms);
        }
    }

    #[tracing_test::traced_test]
    #[tokio::test]
    #[ntest::timeout(20_000)]
    async fn stragglers_are_aborted_after_the_stop_window() {
        let mock = mock_service::spawn(MockConfig {
            delay: Duration::from_secs(10),
            ..Default::default()
        })
        .await
        .unwrap();
        let config = config_with(
            RunKind::Query,
            json!({ "vus": 3, "duration": "200ms" }),
            targets(&mock.base_url()),
        );

        let collected = Collector::new(config)
            .unwrap()
            .graceful_stop(Duration::from_millis(300))
            .run()
            .await
            .unwrap();
        assert!(collected.elapsed < Duration::from_secs(5));
        assert!(collected.samples.is_empty());
        assert_eq!(mock.hits(), 3);
        assert!(logs_contain("Graceful stop elapsed, aborting 3 virtual callers"));
    }

    #[tokio::test]
    async fn rejects_config_its_builder_cannot_serve() {
        let config = config_with(RunKind::Seed, json!({}), targets("http://127.0.0.1:1"));
        let mut collector = Collector::new(config).unwrap();
        collector.builder = builder_for(RunKind::Query);
        assert!(matches!(
            collector.run().await,
            Err(Error::KindMismatch { .. })
        ));
    }
}
