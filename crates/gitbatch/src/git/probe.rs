use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use super::ops::GitOperations;
use super::protocol::{ProtocolState, classify_remote_url};

/// A path exists but is not something we can safely clone into or pull.
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    #[error("{} exists and is not a git working copy", path.display())]
    NotAWorkingCopy { path: PathBuf },

    #[error("{} is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    #[error("cannot inspect {}: {message}", path.display())]
    Unreadable { path: PathBuf, message: String },
}

impl ProbeError {
    fn unreadable(path: &Path, err: impl ToString) -> Self {
        Self::Unreadable {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// Inspects a local path for an existing working copy.
#[async_trait]
pub trait LocalStateProber: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<ProtocolState, ProbeError>;
}

/// Prober backed by the filesystem and `git remote get-url origin`.
#[derive(Clone)]
pub struct GitProber {
    git: GitOperations,
}

impl GitProber {
    pub fn new(git: GitOperations) -> Self {
        Self { git }
    }
}

#[async_trait]
impl LocalStateProber for GitProber {
    async fn probe(&self, path: &Path) -> Result<ProtocolState, ProbeError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ProtocolState::NoneLocal),
            Err(e) => return Err(ProbeError::unreadable(path, e)),
        };
        if !metadata.is_dir() {
            return Err(ProbeError::NotADirectory {
                path: path.to_path_buf(),
            });
        }

        let has_git_dir = tokio::fs::try_exists(path.join(".git"))
            .await
            .map_err(|e| ProbeError::unreadable(path, e))?;
        if !has_git_dir {
            let mut entries = tokio::fs::read_dir(path)
                .await
                .map_err(|e| ProbeError::unreadable(path, e))?;
            let first = entries
                .next_entry()
                .await
                .map_err(|e| ProbeError::unreadable(path, e))?;
            return match first {
                None => Ok(ProtocolState::NoneLocal),
                Some(_) => Err(ProbeError::NotAWorkingCopy {
                    path: path.to_path_buf(),
                }),
            };
        }

        let state = match self
            .git
            .remote_url(path)
            .await
            .map_err(|e| ProbeError::unreadable(path, e))?
        {
            Some(url) => classify_remote_url(&url),
            None => ProtocolState::Unknown,
        };
        tracing::debug!(path = %path.display(), state = %state, "Probed working copy");
        Ok(state)
    }
}
