//! Vision model abstraction.
//!
//! A [`VisionAnalyzer`] turns a photo into narrative text. Calls are single
//! attempt: any transport, auth, quota, or response-shape failure surfaces as
//! [`NarratorError::RemoteService`](narrator_core::error::NarratorError::RemoteService).

use async_trait::async_trait;

use narrator_core::error::Result;

pub mod openai;
pub mod refusal;

pub use openai::OpenAiVision;
pub use refusal::{REFUSAL_MARKER, is_refusal};

/// The core vision provider trait.
#[async_trait]
pub trait VisionAnalyzer: Send + Sync {
    /// Provider identifier (e.g., "openai").
    fn id(&self) -> &str;

    /// Narrate a PNG image.
    ///
    /// `persona` is the system instruction; `history` holds the session's
    /// earlier narrations, oldest first, and may be empty.
    async fn analyze(&self, image_png: &[u8], persona: &str, history: &[String]) -> Result<String>;
}
