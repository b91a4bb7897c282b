//! The caller-facing side: parameters in, one [`Envelope`] out.
//!
//! Every path produces an envelope, including failures before any process was
//! started. Only the success shape carries `ok`.
use crate::artifact::ArtifactError;
use crate::error::{Error, ErrorKind};
use crate::orchestrator::{Execution, Orchestrator, ProcessStatus};
use bakeoff_core::{resolve, Params, Resolved, RunArtifact, RunConfig, RunKind, RunParams, Targets};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope {
    Success(SuccessEnvelope),
    Failure(FailureEnvelope),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SuccessEnvelope {
    pub ok: bool,
    pub meta: Meta,
    pub env_used: EnvUsed,
    pub summary: RunArtifact,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    /// RFC 3339, UTC.
    pub started_at: String,
    /// Collector invocation, program first.
    pub args: Vec<String>,
    /// Effective parameters after defaults were applied.
    pub resolved_args: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FailureEnvelope {
    pub error: String,
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_tail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_tail: Option<String>,
    /// Parse error of an unreadable artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_error: Option<String>,
    /// Leading part of an unreadable artifact.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Whatever the collector managed to persist before failing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_used: Option<EnvUsed>,
}

impl FailureEnvelope {
    fn new(kind: ErrorKind, error: impl fmt::Display) -> Self {
        Self {
            error: error.to_string(),
            kind,
            exit_code: None,
            stdout_tail: None,
            stderr_tail: None,
            json_error: None,
            raw: None,
            summary: None,
            env_used: None,
        }
    }
}

impl FailureEnvelope {
    pub fn invalid_input(error: impl fmt::Display) -> Self {
        Self::new(ErrorKind::InvalidInput, error)
    }
}

impl From<Error> for FailureEnvelope {
    fn from(err: Error) -> Self {
        let kind = err.kind();
        match err {
            Error::ProcessFailure(failure) => Self {
                exit_code: failure.exit_code,
                stdout_tail: Some(failure.stdout_tail.clone()),
                stderr_tail: Some(failure.stderr_tail.clone()),
                ..Self::new(kind, Error::ProcessFailure(failure))
            },
            Error::ArtifactInvalid { reason, preview } => Self {
                json_error: Some(reason.clone()),
                raw: Some(preview.clone()),
                ..Self::new(kind, Error::ArtifactInvalid { reason, preview })
            },
            err => Self::new(kind, err),
        }
    }
}

/// The effective knobs of a run, echoed back so callers can see what defaults
/// they ran with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvUsed {
    pub kind: RunKind,
    pub backend: String,
    pub engine: String,
    pub base: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub vus: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reqs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    pub sleep_s: f64,
    pub no_thresh: bool,
    pub debug: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bulk_path: Option<String>,
}

impl EnvUsed {
    pub fn of(config: &RunConfig) -> Self {
        let (id, count, percent) = match &config.params {
            RunParams::Query(_) => (None, None, None),
            RunParams::Seed { count } => (None, Some(*count), None),
            RunParams::Update { id, .. } => (Some(id.clone()), None, None),
            RunParams::Bulk { percent, count, .. } => (None, *count, Some(*percent)),
        };

        Self {
            kind: config.kind(),
            backend: config.backend.clone(),
            engine: config.engine.to_string(),
            base: config.target.base.to_string(),
            host: config.target.host.clone(),
            vus: config.concurrency.vus(),
            reqs: config.concurrency.iterations(),
            duration: config
                .concurrency
                .duration()
                .map(|d| humantime::format_duration(d).to_string()),
            sleep_s: config.sleep.as_secs_f64(),
            no_thresh: !config.thresholds.enforce,
            debug: config.debug.enabled,
            id,
            count,
            percent,
            bulk_path: config.bulk_path(),
        }
    }
}

impl Envelope {
    pub fn is_ok(&self) -> bool {
        matches!(self, Envelope::Success(_))
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Envelope::Success(_) => None,
            Envelope::Failure(failure) => Some(failure.kind),
        }
    }

    /// HTTP-style status for callers that expose runs over a request/response API.
    pub fn status_code(&self) -> u16 {
        match self.error_kind() {
            None => 200,
            Some(ErrorKind::InvalidInput) => 400,
            Some(_) => 500,
        }
    }

    /// Process exit code for command-line callers.
    pub fn exit_code(&self) -> i32 {
        match self.error_kind() {
            None => 0,
            Some(ErrorKind::InvalidInput) => 2,
            Some(_) => 1,
        }
    }
}

/// Lifecycle of one run, logged on every transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunState {
    Pending,
    Resolved,
    Executing,
    Exited(ProcessStatus),
    ArtifactRead,
    Done(Option<ErrorKind>),
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Pending => f.write_str("pending"),
            RunState::Resolved => f.write_str("resolved"),
            RunState::Executing => f.write_str("executing"),
            RunState::Exited(ProcessStatus::Completed) => f.write_str("completed"),
            RunState::Exited(ProcessStatus::TimedOut) => f.write_str("timed_out"),
            RunState::Exited(ProcessStatus::Failed { .. }) => f.write_str("failed"),
            RunState::ArtifactRead => f.write_str("artifact_read"),
            RunState::Done(None) => f.write_str("success"),
            RunState::Done(Some(kind)) => write!(f, "{}", kind.as_str()),
        }
    }
}

fn transition(state: RunState) {
    debug!(state = %state, "Run state changed");
}

/// Entry point for callers: resolves, executes and consumes one run.
#[derive(Clone, Debug)]
pub struct Bench {
    orchestrator: Orchestrator,
    targets: Targets,
}

impl Bench {
    pub fn new(orchestrator: Orchestrator, targets: Targets) -> Self {
        Self {
            orchestrator,
            targets,
        }
    }

    #[tracing::instrument(skip_all, fields(kind = %kind))]
    pub async fn run(&self, kind: RunKind, params: &Params) -> Envelope {
        let started_at = now_rfc3339();
        transition(RunState::Pending);

        let resolved = match resolve(kind, params, &self.targets) {
            Ok(resolved) => resolved,
            Err(err) => return done(Envelope::Failure(Error::from(err).into())),
        };
        transition(RunState::Resolved);

        transition(RunState::Executing);
        let execution = match self.orchestrator.execute(&resolved.config).await {
            Ok(execution) => execution,
            Err(err) => {
                let mut failure = FailureEnvelope::from(err);
                failure.env_used = Some(EnvUsed::of(&resolved.config));
                return done(Envelope::Failure(failure));
            }
        };
        transition(RunState::Exited(execution.status));

        let read = execution.artifact.read().await;
        transition(RunState::ArtifactRead);

        done(consume(started_at, resolved, execution, read))
    }
}

fn done(envelope: Envelope) -> Envelope {
    let state = RunState::Done(envelope.error_kind());
    match &envelope {
        Envelope::Success(_) => info!("Run succeeded"),
        Envelope::Failure(failure) => {
            warn!(kind = failure.kind.as_str(), "Run failed: {}", failure.error)
        }
    }
    transition(state);
    envelope
}

/// Turns a finished process and its artifact into the envelope. A process
/// failure takes precedence over anything wrong with the artifact.
pub fn consume(
    started_at: String,
    resolved: Resolved,
    execution: Execution,
    read: Result<RunArtifact, ArtifactError>,
) -> Envelope {
    let env_used = EnvUsed::of(&resolved.config);

    if let Some(failure) = execution.failure() {
        let summary = read.ok();
        return Envelope::Failure(FailureEnvelope {
            summary,
            env_used: Some(env_used),
            ..FailureEnvelope::from(Error::ProcessFailure(failure))
        });
    }

    match read {
        Ok(summary) => Envelope::Success(SuccessEnvelope {
            ok: true,
            meta: Meta {
                started_at,
                args: execution.args,
                resolved_args: resolved.args,
            },
            env_used,
            summary,
        }),
        Err(err) => {
            let mut failure = FailureEnvelope::from(Error::from(err));
            if failure.kind == ErrorKind::ArtifactMissing {
                failure.stdout_tail = Some(execution.stdout_tail);
                failure.stderr_tail = Some(execution.stderr_tail);
            }
            failure.env_used = Some(env_used);
            Envelope::Failure(failure)
        }
    }
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}
