//! Local-first store that mirrors every artifact to a remote backend.

use std::sync::Arc;

use async_trait::async_trait;

use narrator_core::error::Result;

use crate::ArtifactStore;
use crate::local::LocalStore;

pub struct MirroredStore {
    local: LocalStore,
    remote: Option<Arc<dyn ArtifactStore>>,
}

impl MirroredStore {
    pub fn new(local: LocalStore, remote: Option<Arc<dyn ArtifactStore>>) -> Self {
        Self { local, remote }
    }
}

#[async_trait]
impl ArtifactStore for MirroredStore {
    fn id(&self) -> &str {
        match &self.remote {
            Some(remote) => remote.id(),
            None => self.local.id(),
        }
    }

    /// Write locally, then remotely. A local failure skips the upload.
    async fn put(&self, name: &str, bytes: &[u8], content_type: &str) -> Result<()> {
        self.local.put(name, bytes, content_type).await?;
        if let Some(remote) = &self.remote {
            remote.put(name, bytes, content_type).await?;
        }
        Ok(())
    }
}
