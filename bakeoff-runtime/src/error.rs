use bakeoff::ArtifactError;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum RuntimeError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Failed reading run config: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Bakeoff(#[from] bakeoff::Error),

    #[error("Failed writing artifact: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
