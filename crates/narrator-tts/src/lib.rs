//! Text-to-speech.
//!
//! A [`SpeechSynthesizer`] turns narrative text into encoded audio bytes in a
//! single attempt. [`text::prepare`] cleans narrations before they are spoken.

use async_trait::async_trait;

use narrator_core::error::Result;

pub mod elevenlabs;
pub mod text;

pub use elevenlabs::{DEFAULT_VOICE_ID, ElevenLabsSynthesizer};

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Provider identifier (e.g., "elevenlabs").
    fn id(&self) -> &str;

    /// Synthesize `text` with `voice_id`, returning the encoded audio.
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>>;
}
