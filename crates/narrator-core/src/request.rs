//! Request identity and artifact naming.
//!
//! A request's three artifacts share one random id as their base name, which
//! is the only link between them in storage.

use std::fmt;

use uuid::Uuid;

/// Unique id of one photo submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Storage name of one of this request's artifacts, e.g. `<id>.png`.
    pub fn artifact_name(&self, kind: ArtifactKind) -> String {
        format!("{}.{}", self.0, kind.extension())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The artifacts a request can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Image,
    Narrative,
    Audio,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Image => "png",
            Self::Narrative => "txt",
            Self::Audio => "mp3",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Image => "image/png",
            Self::Narrative => "text/plain",
            Self::Audio => "audio/mpeg",
        }
    }
}
