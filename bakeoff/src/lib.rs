//! Load-test campaign orchestration.
//!
//! A [`Bench`] resolves caller parameters into a [`RunConfig`], hands it to a
//! separate collector process through the [`Orchestrator`], and turns the
//! persisted [`RunArtifact`] (or the lack of one) into an [`Envelope`].
//!
//! The collector side lives in [`collector`]: virtual callers issue requests
//! built by a [`RequestBuilder`], every call becomes a `RequestSample`, and the
//! samples are reduced once by [`aggregate::summarize`].
pub mod aggregate;
pub mod artifact;
pub mod collector;
pub mod consumer;
pub mod error;
pub mod orchestrator;
pub mod request;
pub mod server_timing;
pub(crate) mod transaction;

pub use artifact::{ArtifactError, ArtifactStore};
pub use collector::{collect, Collected, Collector, Progress};
pub use consumer::{Bench, EnvUsed, Envelope, FailureEnvelope, Meta, SuccessEnvelope};
pub use error::{Error, ErrorKind, ProcessFailure};
pub use orchestrator::{Execution, Orchestrator, ProcessStatus};
pub use request::{builder_for, RequestBuilder, RequestSpec};

pub use bakeoff_core::{
    resolve, Params, RunArtifact, RunConfig, RunKind, Targets, THRESHOLDS_CROSSED_EXIT_CODE,
};
