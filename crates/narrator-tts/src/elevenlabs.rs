//! ElevenLabs text-to-speech.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use narrator_core::config::Config;
use narrator_core::error::{NarratorError, Result};

use crate::SpeechSynthesizer;

const SERVICE: &str = "speech";

/// Voice used when none is configured ("Rachel").
pub const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

pub struct ElevenLabsSynthesizer {
    base_url: String,
    api_key: String,
    model: String,
    output_format: String,
    client: reqwest::Client,
}

impl ElevenLabsSynthesizer {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        output_format: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            output_format: output_format.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from the `tts` config section; fails if no API key resolves.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config
            .tts
            .clone()
            .unwrap_or_default()
            .resolve_api_key()
            .ok_or_else(|| {
                NarratorError::Config(
                    "TTS not configured. Set tts.api_key in config or ELEVENLABS_API_KEY.".into(),
                )
            })?;

        Ok(Self::new(
            &config.tts_base_url(),
            api_key,
            config.tts_model(),
            config.tts_output_format(),
        ))
    }

    /// Request URL for a voice.
    pub fn tts_url(&self, voice_id: &str) -> String {
        format!(
            "{}/v1/text-to-speech/{}?output_format={}",
            self.base_url,
            urlencoding::encode(voice_id),
            urlencoding::encode(&self.output_format)
        )
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsSynthesizer {
    fn id(&self) -> &str {
        "elevenlabs"
    }

    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        debug!(voice = voice_id, model = %self.model, text_len = text.len(), "Requesting speech");

        let resp = self
            .client
            .post(self.tts_url(voice_id))
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/mpeg")
            .json(&json!({
                "text": text,
                "model_id": self.model,
            }))
            .send()
            .await
            .map_err(|e| NarratorError::remote(SERVICE, e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(NarratorError::remote(
                SERVICE,
                format!("ElevenLabs API error ({status}): {body}"),
            ));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| NarratorError::remote(SERVICE, format!("audio body: {e}")))?;

        if bytes.is_empty() {
            return Err(NarratorError::remote(SERVICE, "empty audio response"));
        }

        info!(size_kb = bytes.len() / 1024, voice = voice_id, "TTS audio generated");
        Ok(bytes.to_vec())
    }
}
