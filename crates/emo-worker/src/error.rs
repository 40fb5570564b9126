//! Capture loop error types.

use thiserror::Error;

use emo_client::ClientError;
use emo_media::MediaError;

pub type CaptureResult<T> = Result<T, CaptureError>;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Upload failed: {0}")]
    Client(#[from] ClientError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Cycle task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CaptureError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn settings(msg: impl Into<String>) -> Self {
        Self::Settings(msg.into())
    }

    /// Message shown in the status line.
    pub fn user_message(&self) -> String {
        match self {
            CaptureError::Client(e) => e.user_message(),
            CaptureError::Media(MediaError::NotReady) => "Face detector is not ready".to_string(),
            CaptureError::Media(e) => format!("Face detection failed: {}", e),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_user_message_delegates_to_client() {
        let err = CaptureError::from(ClientError::Timeout(Duration::from_secs(20)));
        assert!(err.user_message().contains("timed out"));
    }

    #[test]
    fn test_user_message_for_detection() {
        let err = CaptureError::from(MediaError::shape_mismatch("4 channels"));
        assert!(err.user_message().starts_with("Face detection failed"));
        assert_eq!(
            CaptureError::from(MediaError::NotReady).user_message(),
            "Face detector is not ready"
        );
    }
}
