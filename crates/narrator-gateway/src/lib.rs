//! WebSocket gateway for the narration pipeline.
//!
//! Each connection gets a [`SessionOrchestrator`] that turns submitted photos
//! into narrated audio. All sessions share one [`Pipeline`] of vision, speech,
//! and storage clients.

pub mod connection;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod pipeline;
pub mod rate_limit;
pub mod server;
pub mod session;
pub mod state;

pub use pipeline::{Pipeline, PipelineSettings};
pub use server::{router, start_gateway};
pub use session::{MessageOutcome, SessionOrchestrator, SessionState};
pub use state::GatewayState;
