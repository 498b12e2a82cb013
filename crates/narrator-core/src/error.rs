use thiserror::Error;

#[derive(Debug, Error)]
pub enum NarratorError {
    /// Inbound payload is not a `data:image/png;base64,...` PNG.
    #[error("Format error: {0}")]
    Format(String),

    /// The vision or speech service failed (transport, auth, quota, timeout, bad response).
    #[error("Remote service error ({service}): {message}")]
    RemoteService {
        service: &'static str,
        message: String,
    },

    /// The vision model declined to narrate the image.
    #[error("Refusal detected in analysis")]
    RefusalDetected(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NarratorError {
    pub fn remote(service: &'static str, message: impl Into<String>) -> Self {
        Self::RemoteService {
            service,
            message: message.into(),
        }
    }

    /// Short, stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Format(_) => "format",
            Self::RemoteService { .. } => "remote_service",
            Self::RefusalDetected(_) => "refusal",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Other(_) => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, NarratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_display_names_service() {
        let err = NarratorError::remote("vision", "429 Too Many Requests");
        assert_eq!(
            err.to_string(),
            "Remote service error (vision): 429 Too Many Requests"
        );
        assert_eq!(err.kind(), "remote_service");
    }

    #[test]
    fn test_io_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: NarratorError = io.into();
        assert_eq!(err.kind(), "io");
    }
}
