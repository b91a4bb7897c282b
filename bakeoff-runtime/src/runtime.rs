//! Dispatches the two faces of the binary.
//!
//! `run` is the caller side: it resolves parameters, re-invokes this binary as
//! a collector under a wall-clock budget and prints one JSON envelope on stdout.
//! `collect` is the collector side: it executes a serialized run config and
//! persists the artifact, exiting with a dedicated code when enforced
//! thresholds were crossed.
use crate::cli::{BakeoffCli, CollectArgs, Command, RunArgs};
use crate::error::RuntimeError;
use bakeoff::consumer::FailureEnvelope;
use bakeoff::{
    ArtifactStore, Bench, Collector, Envelope, Orchestrator, Progress, RunArtifact, RunConfig,
    Targets,
};
use bakeoff_core::{ConcurrencyMode, THRESHOLDS_CROSSED_EXIT_CODE};
use clap::Parser;
use std::process::ExitCode;
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, instrument, warn};

/// Period of the progress lines the collector prints while running.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// # Example
///
/// ```ignore
/// #[tokio::main]
/// async fn main() -> std::process::ExitCode {
///     bakeoff_runtime::init_logging();
///     BakeoffRuntime::new().with_args().run().await
/// }
/// ```
#[derive(Default)]
pub struct BakeoffRuntime {
    command: Option<Command>,
}

impl BakeoffRuntime {
    pub fn new() -> Self {
        Self { command: None }
    }

    /// Take the command from the process arguments.
    pub fn with_args(mut self) -> Self {
        self.command = Some(BakeoffCli::parse().command);
        self
    }

    pub fn command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }

    pub async fn run(self) -> ExitCode {
        let command = match self.command {
            Some(command) => command,
            None => BakeoffCli::parse().command,
        };

        match command {
            Command::Run(args) => run_campaign(args).await,
            Command::Collect(args) => match run_collector(args).await {
                Ok(artifact) if artifact.summary.thresholds.crossed() => {
                    warn!("Thresholds crossed");
                    exit_code(THRESHOLDS_CROSSED_EXIT_CODE)
                }
                Ok(_) => ExitCode::SUCCESS,
                Err(err) => {
                    error!("Collector failed: {err}");
                    ExitCode::FAILURE
                }
            },
        }
    }
}

#[instrument(name = "run", skip_all, fields(kind = %args.kind))]
async fn run_campaign(args: RunArgs) -> ExitCode {
    let envelope = match bench(&args) {
        Ok(bench) => match args.params() {
            Ok(params) => bench.run(args.kind, &params).await,
            Err(reason) => invalid(RuntimeError::InvalidParams(reason)),
        },
        Err(err) => Envelope::Failure(FailureEnvelope::from(err)),
    };

    match serde_json::to_string_pretty(&envelope) {
        Ok(json) => println!("{json}"),
        Err(err) => {
            error!("Failed encoding envelope: {err}");
            return ExitCode::FAILURE;
        }
    }

    exit_code(envelope.exit_code())
}

fn bench(args: &RunArgs) -> Result<Bench, bakeoff::Error> {
    let mut targets = Targets::default();
    if let Some(url) = &args.pimcore_base {
        targets = targets.base("pimcore", url.clone());
    }
    if let Some(url) = &args.symfony_base {
        targets = targets.base("symfony", url.clone());
    }
    for (name, url) in &args.bases {
        targets = targets.base(name, url.clone());
    }
    let targets = targets
        .router(args.router.clone())
        .insecure_tls(args.insecure_tls);

    let mut orchestrator = Orchestrator::current_exe(&args.workdir)?;
    if let Some(timeout) = args.timeout {
        orchestrator = orchestrator.timeout(timeout);
    }

    Ok(Bench::new(orchestrator, targets))
}

fn invalid(err: RuntimeError) -> Envelope {
    warn!("{err}");
    Envelope::Failure(FailureEnvelope::invalid_input(err))
}

#[instrument(name = "collect", skip_all)]
async fn run_collector(args: CollectArgs) -> Result<RunArtifact, RuntimeError> {
    let raw = tokio::fs::read(&args.config).await?;
    let config: RunConfig = serde_json::from_slice(&raw)?;
    info!(
        "Collecting {} run against {} ({})",
        config.kind(),
        config.backend,
        config.target.base
    );

    println!(
        "collecting {} {} on {}: {}",
        config.kind(),
        config.engine,
        config.backend,
        describe_mode(&config)
    );

    let collector = Collector::new(config)?;
    let reporter = tokio::spawn(report_progress(collector.progress()));
    let collected = collector.artifact().await;
    reporter.abort();

    let artifact = collected?;
    ArtifactStore::new(&args.artifact).write(&artifact).await?;

    print_summary(&artifact);
    Ok(artifact)
}

fn describe_mode(config: &RunConfig) -> String {
    match config.concurrency {
        ConcurrencyMode::FixedRequests { n } => format!("{n} requests over {n} virtual callers"),
        ConcurrencyMode::RateOverTime { vus, duration } => format!(
            "{vus} virtual callers for {}",
            humantime::format_duration(duration)
        ),
    }
}

/// Prints call counts at a fixed interval until aborted.
async fn report_progress(progress: Progress) {
    let start = Instant::now();
    let mut ticks = tokio::time::interval_at(start + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
    loop {
        ticks.tick().await;
        println!(
            "running {}s: {} requests, {} failed",
            start.elapsed().as_secs(),
            progress.completed(),
            progress.failed()
        );
    }
}

/// Short human-readable digest, kept in the caller's output tail.
fn print_summary(artifact: &RunArtifact) {
    let summary = &artifact.summary;
    let ms = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.2}ms"));

    println!(
        "{} {} on {}: {} requests, {:.2}% failed",
        artifact.identity.kind,
        artifact.identity.engine,
        artifact.identity.backend,
        summary.totals.http_reqs,
        summary.totals.http_req_failed * 100.,
    );
    println!(
        "latency avg={} p50={} p95={} p99={}",
        ms(summary.latency_ms.avg),
        ms(summary.latency_ms.p50),
        ms(summary.latency_ms.p95),
        ms(summary.latency_ms.p99),
    );
    println!(
        "status 2xx={} 3xx={} 4xx={} 5xx={}",
        summary.totals.status_2xx,
        summary.totals.status_3xx,
        summary.totals.status_4xx,
        summary.totals.status_5xx,
    );
    if let Some(rps) = summary.throughput.est_rps {
        println!("throughput {rps} req/s");
    }
    let thresholds = &summary.thresholds;
    println!(
        "thresholds {} (p95 < {}ms, failure rate < {}){}",
        if thresholds.passed { "passed" } else { "failed" },
        thresholds.p95_limit_ms,
        thresholds.max_failure_rate,
        if thresholds.enforced { "" } else { ", not enforced" },
    );
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
