//! Gateway shared state.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use narrator_core::config::Config;

use crate::pipeline::Pipeline;
use crate::rate_limit::SessionLimiter;

/// Shared gateway state accessible from all connections and handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub pipeline: Arc<Pipeline>,
    pub rate_limiter: Option<Arc<SessionLimiter>>,
    pub connections: RwLock<HashMap<String, ConnectionInfo>>,
}

/// A live session, as reported by `/health`.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub conn_id: String,
    pub peer: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionInfo {
    /// Whole seconds the session has been open.
    pub fn duration_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.connected_at).num_seconds().max(0)
    }
}

impl GatewayState {
    pub fn new(config: Arc<Config>, pipeline: Pipeline) -> Self {
        let rate_limiter = config
            .gateway
            .as_ref()
            .and_then(|g| g.rate_limit.as_ref())
            .map(|rl| Arc::new(SessionLimiter::new(rl.max_sessions_per_ip)));

        Self {
            config,
            pipeline: Arc::new(pipeline),
            rate_limiter,
            connections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, conn_id: &str, peer: SocketAddr) {
        self.connections.write().await.insert(
            conn_id.to_string(),
            ConnectionInfo {
                conn_id: conn_id.to_string(),
                peer,
                connected_at: Utc::now(),
            },
        );
    }

    /// Forget a session, returning what was known about it.
    pub async fn unregister(&self, conn_id: &str) -> Option<ConnectionInfo> {
        self.connections.write().await.remove(conn_id)
    }

    pub async fn session_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
