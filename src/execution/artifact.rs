//! Ephemeral script files in the workspace.
//!
//! An [`Artifact`] owns exactly one file named after a fresh UUID. The file
//! is removed when the artifact is dropped, so every exit path of an
//! invocation (success, failure, timeout, cancelled request) cleans up.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::ExecutionError;

#[derive(Debug)]
pub struct Artifact {
    id: Uuid,
    workspace: PathBuf,
    path: PathBuf,
}

impl Artifact {
    /// Write `contents` to a new uniquely named file under `workspace`.
    ///
    /// The file is opened with `create_new`, so an identifier collision is
    /// reported instead of silently overwriting another invocation's script.
    /// A relative `workspace` is resolved against the current directory, so
    /// the stored path stays valid whatever directory the child runs in.
    pub async fn persist(workspace: &Path, contents: &str) -> Result<Self, ExecutionError> {
        let workspace = std::path::absolute(workspace).map_err(|e| {
            ExecutionError::resource(
                format!("Failed to resolve workspace {}", workspace.display()),
                e,
            )
        })?;

        fs::create_dir_all(&workspace).await.map_err(|e| {
            ExecutionError::resource(
                format!("Failed to create workspace {}", workspace.display()),
                e,
            )
        })?;

        let id = Uuid::new_v4();
        let path = workspace.join(format!("script-{}.py", id));

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| {
                ExecutionError::resource(format!("Failed to create {}", path.display()), e)
            })?;

        // From here on the guard owns the path, so a failed write still cleans up.
        let artifact = Self {
            id,
            workspace,
            path,
        };

        file.write_all(contents.as_bytes())
            .await
            .map_err(|e| ExecutionError::resource("Failed to write script", e))?;
        file.flush()
            .await
            .map_err(|e| ExecutionError::resource("Failed to write script", e))?;

        debug!("Persisted artifact {}", artifact.path.display());
        Ok(artifact)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Absolute path of the script file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absolute workspace directory the script lives in.
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed artifact {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("Artifact {} was already gone", self.path.display())
            }
            Err(e) => warn!(
                "Failed to clean up temporary file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
