//! Local filesystem artifact store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use narrator_core::error::{NarratorError, Result};

use crate::ArtifactStore;

pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Open (and create if needed) the artifact directory.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            NarratorError::Storage(format!("cannot create {}: {e}", dir.display()))
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Artifact names are flat file names; anything that could escape the directory is rejected.
fn check_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name == "."
        || name == ".."
    {
        return Err(NarratorError::Storage(format!(
            "invalid artifact name '{name}'"
        )));
    }
    Ok(())
}

#[async_trait]
impl ArtifactStore for LocalStore {
    fn id(&self) -> &str {
        "local"
    }

    async fn put(&self, name: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        check_name(name)?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            NarratorError::Storage(format!("write {}: {e}", path.display()))
        })?;
        debug!(
            path = %path.display(),
            content_type,
            size = bytes.len(),
            "Artifact written locally"
        );
        Ok(())
    }
}
