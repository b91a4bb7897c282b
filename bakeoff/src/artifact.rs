use crate::error::Error;
use bakeoff_core::{RunArtifact, ARTIFACT_FILE_NAME, ARTIFACT_PREVIEW_CHARS};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("{} not found", .0.display())]
    Missing(PathBuf),

    #[error("Artifact is not valid JSON: {reason}")]
    Invalid { reason: String, preview: String },

    #[error("Failed encoding artifact: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("I/O error on artifact: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ArtifactError> for Error {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::Missing(path) => Error::ArtifactMissing(path),
            ArtifactError::Invalid { reason, preview } => Error::ArtifactInvalid { reason, preview },
            ArtifactError::Encode(err) => Error::Json(err),
            ArtifactError::Io(err) => Error::Io(err),
        }
    }
}

/// The single JSON document a collector run leaves behind.
///
/// Writes go through a sibling temp file and a rename, so a reader sees either
/// the previous state or the complete artifact.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(ARTIFACT_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Removes a stale artifact. A missing file is not an error.
    pub async fn clear(&self) -> Result<(), ArtifactError> {
        match tokio::fs::remove_file(&self.path).await {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    pub async fn write(&self, artifact: &RunArtifact) -> Result<(), ArtifactError> {
        let encoded = serde_json::to_vec_pretty(artifact)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, encoded).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    pub async fn read(&self) -> Result<RunArtifact, ArtifactError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ArtifactError::Missing(self.path.clone()))
            }
            Err(err) => return Err(err.into()),
        };

        serde_json::from_slice(&bytes).map_err(|err| ArtifactError::Invalid {
            reason: err.to_string(),
            preview: String::from_utf8_lossy(&bytes)
                .chars()
                .take(ARTIFACT_PREVIEW_CHARS)
                .collect(),
        })
    }
}
