//! Per-connection session orchestrator.
//!
//! A session waits for a photo, then drives it through decode, persistence,
//! analysis, the refusal check, and synthesis before waiting again. Messages
//! are handled strictly one at a time: the connection's read loop awaits
//! [`SessionOrchestrator::handle_message`] before reading the next frame.
//!
//! Every error raised while handling a message is resolved here. None of them
//! close the connection.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use narrator_core::config::MalformedInputPolicy;
use narrator_core::error::{NarratorError, Result};
use narrator_core::protocol::{
    ACKNOWLEDGED, ClientMessage, FAILURE, GENERATING_AUDIO, GREETING, MALFORMED_INPUT, PONG,
};
use narrator_core::request::{ArtifactKind, RequestId};
use narrator_media::decode_data_uri;
use narrator_providers::is_refusal;
use narrator_tts::text;

use crate::pipeline::Pipeline;

/// Where a session is in handling the current photo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingImage,
    Decoding,
    PersistingImage,
    Analyzing,
    CheckingAnalysis,
    Synthesizing,
    Failed,
}

/// How one inbound message was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Pong,
    Delivered,
    Refused,
    RemoteError,
    StorageError,
    InternalError,
    Malformed,
}

impl MessageOutcome {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pong => "ping",
            Self::Delivered => "success",
            Self::Refused => "refused",
            Self::RemoteError => "remote_error",
            Self::StorageError => "storage_error",
            Self::InternalError => "internal_error",
            Self::Malformed => "malformed",
        }
    }
}

pub struct SessionOrchestrator {
    pipeline: Arc<Pipeline>,
    conn_id: String,
    outbound: mpsc::UnboundedSender<String>,
    state: SessionState,
    history: VecDeque<String>,
}

impl SessionOrchestrator {
    pub fn new(
        pipeline: Arc<Pipeline>,
        conn_id: impl Into<String>,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Self {
        let capacity = pipeline.settings.history_turns;
        Self {
            pipeline,
            conn_id: conn_id.into(),
            outbound,
            state: SessionState::AwaitingImage,
            history: VecDeque::with_capacity(capacity),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Earlier narrations of this session, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    /// Send the greeting. Called once when the connection opens.
    pub fn greet(&self) {
        self.send(GREETING);
    }

    /// Handle one inbound text frame and return to `AwaitingImage`.
    pub async fn handle_message(&mut self, text: &str) -> MessageOutcome {
        let outcome = match ClientMessage::classify(text) {
            ClientMessage::Ping => {
                debug!(conn_id = %self.conn_id, "Ping");
                self.send(PONG);
                MessageOutcome::Pong
            }
            ClientMessage::Submission(payload) => {
                let result = self.run_request(payload).await;
                self.resolve(result, payload.len())
            }
        };

        #[cfg(feature = "metrics")]
        crate::metrics::record_outcome(outcome.as_str());

        self.state = SessionState::AwaitingImage;
        outcome
    }

    /// Map the result of one submission to what the client is told.
    fn resolve(&mut self, result: Result<()>, payload_len: usize) -> MessageOutcome {
        match result {
            Ok(()) => MessageOutcome::Delivered,
            Err(NarratorError::Format(reason)) => {
                debug!(
                    conn_id = %self.conn_id,
                    %reason,
                    len = payload_len,
                    "Ignoring malformed input"
                );
                if self.pipeline.settings.malformed_input == MalformedInputPolicy::Notify {
                    self.send(MALFORMED_INPUT);
                }
                MessageOutcome::Malformed
            }
            Err(NarratorError::RefusalDetected(narrative)) => {
                warn!(conn_id = %self.conn_id, %narrative, "Vision model refused to narrate");
                self.fail();
                MessageOutcome::Refused
            }
            Err(NarratorError::RemoteService { service, message }) => {
                error!(
                    conn_id = %self.conn_id,
                    state = ?self.state,
                    service,
                    %message,
                    "Remote service failed"
                );
                self.fail();
                MessageOutcome::RemoteError
            }
            Err(NarratorError::Storage(message)) => {
                error!(
                    conn_id = %self.conn_id,
                    state = ?self.state,
                    %message,
                    "Artifact storage failed"
                );
                self.fail();
                MessageOutcome::StorageError
            }
            Err(
                e @ (NarratorError::Config(_)
                | NarratorError::Io(_)
                | NarratorError::Json(_)
                | NarratorError::Other(_)),
            ) => {
                error!(conn_id = %self.conn_id, kind = e.kind(), error = %e, "Request failed");
                self.fail();
                MessageOutcome::InternalError
            }
        }
    }

    async fn run_request(&mut self, payload: &str) -> Result<()> {
        self.state = SessionState::Decoding;
        let image = decode_data_uri(payload)?;

        self.state = SessionState::PersistingImage;
        let id = RequestId::new();
        info!(
            conn_id = %self.conn_id,
            request_id = %id,
            width = image.width(),
            height = image.height(),
            "Photo received"
        );
        let png = image.encode_png()?;
        self.persist(&id, ArtifactKind::Image, &png).await?;
        self.send(ACKNOWLEDGED);

        self.state = SessionState::Analyzing;
        let pipeline = self.pipeline.clone();
        let settings = &pipeline.settings;
        let history: Vec<String> = self.history.iter().cloned().collect();
        let started = Instant::now();
        let narrative = bounded(
            "vision",
            settings.remote_timeout,
            pipeline.analyzer.analyze(&png, &settings.persona, &history),
        )
        .await?;
        record_stage("vision", started);

        self.state = SessionState::CheckingAnalysis;
        if is_refusal(&narrative) {
            return Err(NarratorError::RefusalDetected(narrative));
        }

        self.state = SessionState::Synthesizing;
        self.send(GENERATING_AUDIO);
        self.persist(&id, ArtifactKind::Narrative, narrative.as_bytes()).await?;

        let spoken = text::prepare(
            &narrative,
            settings.strip_stage_directions,
            settings.lead_in.as_deref(),
        );
        let started = Instant::now();
        let audio = bounded(
            "speech",
            settings.remote_timeout,
            pipeline.synthesizer.synthesize(&spoken, &settings.voice_id),
        )
        .await?;
        record_stage("speech", started);
        self.persist(&id, ArtifactKind::Audio, &audio).await?;

        let url = pipeline.audio_url(&id);
        info!(conn_id = %self.conn_id, request_id = %id, %url, "Narration delivered");
        self.send(&url);
        self.send(&narrative);
        self.remember(narrative);
        Ok(())
    }

    async fn persist(&self, id: &RequestId, kind: ArtifactKind, bytes: &[u8]) -> Result<()> {
        let name = id.artifact_name(kind);
        let started = Instant::now();
        self.pipeline
            .store
            .put(&name, bytes, kind.content_type())
            .await
            .map_err(|e| match e {
                NarratorError::Storage(_) => e,
                other => NarratorError::Storage(format!("{name}: {other}")),
            })?;
        record_stage("storage", started);
        debug!(conn_id = %self.conn_id, artifact = %name, size = bytes.len(), "Artifact stored");
        Ok(())
    }

    fn remember(&mut self, narrative: String) {
        let limit = self.pipeline.settings.history_turns;
        if limit == 0 {
            return;
        }
        while self.history.len() >= limit {
            self.history.pop_front();
        }
        self.history.push_back(narrative);
    }

    fn fail(&mut self) {
        self.state = SessionState::Failed;
        self.send(FAILURE);
    }

    /// Queue a frame for the writer task. A closed channel means the client
    /// left; the request still runs to completion.
    fn send(&self, text: &str) {
        if self.outbound.send(text.to_string()).is_err() {
            debug!(conn_id = %self.conn_id, "Client gone; dropping outbound message");
        }
    }
}

/// Await `fut`, failing as a remote error of `service` once `limit` elapses.
async fn bounded<T>(
    service: &'static str,
    limit: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            NarratorError::remote(service, format!("timed out after {}s", limit.as_secs_f64()))
        })?,
        None => fut.await,
    }
}

#[cfg(feature = "metrics")]
fn record_stage(stage: &'static str, started: Instant) {
    crate::metrics::record_stage(stage, started.elapsed().as_secs_f64());
}

#[cfg(not(feature = "metrics"))]
fn record_stage(_stage: &'static str, _started: Instant) {}
