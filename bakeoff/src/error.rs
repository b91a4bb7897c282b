use bakeoff_core::{ResolveError, RunKind};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ResolveError),

    #[error("Collector process failed: {0}")]
    ProcessFailure(ProcessFailure),

    #[error("{} not found after run", .0.display())]
    ArtifactMissing(PathBuf),

    #[error("Artifact is not valid JSON: {reason}")]
    ArtifactInvalid { reason: String, preview: String },

    #[error("The {builder} request builder cannot serve a {kind} run")]
    KindMismatch { builder: RunKind, kind: RunKind },

    #[error("Invalid request target: {0}")]
    Target(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable, machine-readable name of the failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) | Error::KindMismatch { .. } | Error::Target(_) => {
                ErrorKind::InvalidInput
            }
            Error::ProcessFailure(failure) if failure.timed_out => ErrorKind::ProcessTimedOut,
            Error::ProcessFailure(_) | Error::Http(_) | Error::Io(_) => ErrorKind::ProcessFailed,
            Error::ArtifactMissing(_) => ErrorKind::ArtifactMissing,
            Error::ArtifactInvalid { .. } | Error::Json(_) => ErrorKind::ArtifactInvalid,
        }
    }
}

/// Non-zero exit or timeout of the collector process, with the tail of its output.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{}", describe(.timed_out, .exit_code))]
pub struct ProcessFailure {
    pub timed_out: bool,
    pub exit_code: Option<i32>,
    pub stdout_tail: String,
    pub stderr_tail: String,
}

fn describe(timed_out: &bool, exit_code: &Option<i32>) -> String {
    match (timed_out, exit_code) {
        (true, _) => "timed out".to_string(),
        (false, Some(code)) => format!("exit code {code}"),
        (false, None) => "terminated by signal".to_string(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    ProcessFailed,
    ProcessTimedOut,
    ArtifactMissing,
    ArtifactInvalid,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::ProcessFailed => "process_failed",
            ErrorKind::ProcessTimedOut => "process_timed_out",
            ErrorKind::ArtifactMissing => "artifact_missing",
            ErrorKind::ArtifactInvalid => "artifact_invalid",
        }
    }

    pub fn is_process_failure(&self) -> bool {
        matches!(self, ErrorKind::ProcessFailed | ErrorKind::ProcessTimedOut)
    }
}
