//! Artifact storage.
//!
//! Each [`ArtifactStore`] accepts write-once named blobs. The pipeline writes
//! through a [`MirroredStore`]: a local directory first, then the configured
//! object store.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use narrator_core::config::Config;
use narrator_core::error::Result;

pub mod gcs;
pub mod local;
pub mod mirror;

pub use gcs::GcsStore;
pub use local::LocalStore;
pub use mirror::MirroredStore;

/// Durable destination for request artifacts.
///
/// Implementations are shared by every session and must tolerate concurrent `put`s.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Backend identifier for logs (e.g. "local", "gcs").
    fn id(&self) -> &str;

    /// Store `bytes` under `name` with the given MIME type.
    async fn put(&self, name: &str, bytes: &[u8], content_type: &str) -> Result<()>;
}

/// Build the artifact store described by `config`.
///
/// Always writes locally; mirrors to GCS when a bucket and service account are configured.
pub async fn from_config(config: &Config) -> anyhow::Result<Arc<dyn ArtifactStore>> {
    let local = LocalStore::new(config.local_dir()).await?;
    info!(dir = %local.dir().display(), "Local artifact store ready");

    let service_account = config
        .storage
        .as_ref()
        .and_then(|s| s.service_account_json.as_deref());

    let remote: Option<Arc<dyn ArtifactStore>> = match (config.bucket(), service_account) {
        (Some(bucket), Some(sa_path)) => {
            let gcs = GcsStore::from_service_account_file(bucket, sa_path, config.remote_timeout())
                .await?;
            info!(bucket, "GCS artifact store ready");
            Some(Arc::new(gcs))
        }
        (Some(bucket), None) => {
            warn!(bucket, "Bucket configured without a service account; uploads disabled");
            None
        }
        (None, _) => None,
    };

    Ok(Arc::new(MirroredStore::new(local, remote)))
}
