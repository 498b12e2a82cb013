//! Axum-based WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    extract::{ConnectInfo, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use narrator_core::config::TlsConfig;

use crate::connection::handle_ws_connection;
use crate::state::GatewayState;

/// Start the gateway and serve until Ctrl-C.
///
/// Serves `wss://` when TLS material is configured, plain `ws://` otherwise.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let bind_addr = state.config.gateway_bind();
    let addr = tokio::net::lookup_host((bind_addr.as_str(), port))
        .await
        .with_context(|| format!("Cannot resolve bind address {bind_addr}"))?
        .next()
        .with_context(|| format!("No address found for {bind_addr}"))?;

    let app = router(state.clone());

    match state.config.tls() {
        Some(tls) => serve_tls(app, addr, tls).await,
        None => serve_plain(app, addr).await,
    }
}

/// The gateway routes. The WebSocket endpoint answers at both `/` and `/ws`.
pub fn router(state: Arc<GatewayState>) -> Router {
    let app = Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler));

    #[cfg(feature = "metrics")]
    let app = with_metrics_route(app);

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

#[cfg(feature = "metrics")]
fn with_metrics_route(app: Router<Arc<GatewayState>>) -> Router<Arc<GatewayState>> {
    match crate::metrics::install_prometheus_recorder() {
        Ok(handle) => app.route("/metrics", get(move || async move { handle.render() })),
        Err(e) => {
            tracing::warn!(error = %e, "Metrics endpoint disabled");
            app
        }
    }
}

async fn serve_plain(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Gateway listening on ws://{addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

#[cfg(feature = "tls")]
async fn serve_tls(app: Router, addr: SocketAddr, tls: &TlsConfig) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    // reqwest and axum-server each enable a rustls backend; pick one for the process.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let rustls_config = RustlsConfig::from_pem_file(&tls.cert_path, &tls.key_path)
        .await
        .with_context(|| {
            format!(
                "Failed to load TLS certificate {} / key {}",
                tls.cert_path, tls.key_path
            )
        })?;

    let handle = axum_server::Handle::new();
    let shutdown = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
    });

    info!("Gateway listening on wss://{addr}");
    axum_server::bind_rustls(addr, rustls_config)
        .handle(handle)
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}

#[cfg(not(feature = "tls"))]
async fn serve_tls(_app: Router, _addr: SocketAddr, _tls: &TlsConfig) -> anyhow::Result<()> {
    anyhow::bail!("TLS is configured but this build was compiled without the `tls` feature")
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<Arc<GatewayState>>,
) -> Response {
    let permit = match &state.rate_limiter {
        Some(limiter) => match limiter.try_acquire(peer.ip()) {
            Some(permit) => Some(permit),
            None => {
                return (
                    StatusCode::TOO_MANY_REQUESTS,
                    "Too many sessions from this address",
                )
                    .into_response();
            }
        },
        None => None,
    };

    let max_payload = state.config.max_payload_bytes();
    ws.max_message_size(max_payload)
        .max_frame_size(max_payload)
        .on_upgrade(move |socket| async move {
            // Held for the life of the session.
            let _permit = permit;
            handle_ws_connection(state, socket, peer).await;
        })
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let version = env!("CARGO_PKG_VERSION");
    let sessions = state.session_count().await;

    axum::Json(json!({
        "status": "ok",
        "version": version,
        "sessions": sessions,
    }))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
