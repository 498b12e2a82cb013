//! Prometheus metrics recording and endpoint.

use anyhow::Context;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return the handle used by `/metrics`.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// Record a new session.
pub fn record_session_open() {
    metrics::gauge!("narrator_sessions_active").increment(1.0);
}

/// Record a session ending.
pub fn record_session_close() {
    metrics::gauge!("narrator_sessions_active").decrement(1.0);
}

/// Count the outcome of one inbound message.
pub fn record_outcome(outcome: &'static str) {
    metrics::counter!("narrator_requests_total", "outcome" => outcome).increment(1);
}

/// Record how long a pipeline stage took.
pub fn record_stage(stage: &'static str, duration_secs: f64) {
    metrics::histogram!("narrator_stage_duration_seconds", "stage" => stage).record(duration_secs);
}
