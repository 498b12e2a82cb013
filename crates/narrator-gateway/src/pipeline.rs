//! Shared pipeline collaborators and per-request settings.
//!
//! One [`Pipeline`] is built at startup and shared by every session. It holds
//! only immutable settings and `Send + Sync` clients.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use narrator_core::config::{Config, MalformedInputPolicy};
use narrator_core::request::{ArtifactKind, RequestId};
use narrator_providers::{OpenAiVision, VisionAnalyzer};
use narrator_storage::ArtifactStore;
use narrator_tts::{DEFAULT_VOICE_ID, ElevenLabsSynthesizer, SpeechSynthesizer};

/// Immutable per-request knobs derived from config.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub persona: String,
    pub voice_id: String,
    /// Base of the URL sent to clients, without a trailing slash.
    pub public_base_url: String,
    /// Upper bound on each remote call. `None` waits indefinitely.
    pub remote_timeout: Option<Duration>,
    pub strip_stage_directions: bool,
    pub lead_in: Option<String>,
    /// Prior narrations passed to the analyzer. 0 disables history.
    pub history_turns: usize,
    pub malformed_input: MalformedInputPolicy,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            persona: config.persona(),
            voice_id: config.voice().unwrap_or_else(|| DEFAULT_VOICE_ID.to_string()),
            public_base_url: config.public_base_url(),
            remote_timeout: config.remote_timeout(),
            strip_stage_directions: config.strip_stage_directions(),
            lead_in: config.tts.as_ref().and_then(|t| t.lead_in.clone()),
            history_turns: config.history_turns(),
            malformed_input: config.malformed_input(),
        }
    }
}

/// The collaborators a session drives for each photo.
#[derive(Clone)]
pub struct Pipeline {
    pub analyzer: Arc<dyn VisionAnalyzer>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub store: Arc<dyn ArtifactStore>,
    pub settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        analyzer: Arc<dyn VisionAnalyzer>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        store: Arc<dyn ArtifactStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            analyzer,
            synthesizer,
            store,
            settings,
        }
    }

    /// Build the production pipeline: OpenAI vision, ElevenLabs speech, and
    /// the configured artifact store.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let analyzer =
            OpenAiVision::from_config(config).context("Failed to configure vision analyzer")?;
        let synthesizer = ElevenLabsSynthesizer::from_config(config)
            .context("Failed to configure speech synthesizer")?;
        let store = narrator_storage::from_config(config)
            .await
            .context("Failed to configure artifact store")?;

        Ok(Self::new(
            Arc::new(analyzer),
            Arc::new(synthesizer),
            store,
            PipelineSettings::from_config(config),
        ))
    }

    /// Public URL of a request's audio artifact.
    pub fn audio_url(&self, id: &RequestId) -> String {
        format!(
            "{}/{}",
            self.settings.public_base_url,
            id.artifact_name(ArtifactKind::Audio)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use narrator_core::config::{PipelineConfig, StorageConfig, TtsConfig};

    #[test]
    fn test_settings_defaults() {
        let settings = PipelineSettings::from_config(&Config::default());
        assert_eq!(settings.voice_id, DEFAULT_VOICE_ID);
        assert_eq!(settings.history_turns, 0);
        assert_eq!(settings.remote_timeout, Some(Duration::from_secs(120)));
        assert_eq!(settings.malformed_input, MalformedInputPolicy::Ignore);
        assert!(settings.strip_stage_directions);
        assert!(settings.lead_in.is_none());
        assert!(settings.persona.contains("Sir David Attenborough"));
    }

    #[test]
    fn test_settings_from_sections() {
        let config = Config {
            tts: Some(TtsConfig {
                voice: Some("narrator-voice".into()),
                lead_in: Some("-- --".into()),
                strip_stage_directions: false,
                ..Default::default()
            }),
            storage: Some(StorageConfig {
                bucket: Some("photos".into()),
                ..Default::default()
            }),
            pipeline: Some(PipelineConfig {
                remote_timeout_secs: Some(0),
                history_turns: Some(3),
                malformed_input: MalformedInputPolicy::Notify,
            }),
            ..Config::default()
        };
        let settings = PipelineSettings::from_config(&config);
        assert_eq!(settings.voice_id, "narrator-voice");
        assert_eq!(settings.lead_in.as_deref(), Some("-- --"));
        assert!(!settings.strip_stage_directions);
        assert_eq!(settings.public_base_url, "https://storage.googleapis.com/photos");
        assert!(settings.remote_timeout.is_none());
        assert_eq!(settings.history_turns, 3);
        assert_eq!(settings.malformed_input, MalformedInputPolicy::Notify);
    }
}
