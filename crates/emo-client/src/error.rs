//! Classification client error types.

use std::time::Duration;

use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Service unreachable: {0}")]
    Unreachable(String),

    #[error("Service returned {status}: {detail}")]
    Server { status: u16, detail: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl ClientError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Unreachable(_) => true,
            ClientError::Server { status, .. } => matches!(status, 502..=504),
            _ => false,
        }
    }

    /// Short message for the capture status line.
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Timeout(after) => format!(
                "Emotion service timed out after {}s",
                after.as_secs_f32().round()
            ),
            ClientError::Unreachable(_) | ClientError::Network(_) => {
                "Emotion service unreachable".to_string()
            }
            ClientError::Server { status, detail } => {
                format!("Emotion service error ({}): {}", status, detail)
            }
            ClientError::MalformedResponse(_) => {
                "Emotion service sent an unreadable response".to_string()
            }
            ClientError::InvalidRequest(msg) => format!("Upload rejected: {}", msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_distinguish_failure_kinds() {
        let timeout = ClientError::Timeout(Duration::from_secs(20)).user_message();
        let unreachable = ClientError::Unreachable("refused".into()).user_message();
        let server = ClientError::Server {
            status: 413,
            detail: "Image too large".into(),
        }
        .user_message();
        let malformed = ClientError::malformed("eof").user_message();

        assert!(timeout.contains("timed out") && timeout.contains("20"));
        assert!(unreachable.contains("unreachable"));
        assert!(server.contains("413") && server.contains("Image too large"));
        assert!(malformed.contains("unreadable"));
    }

    #[test]
    fn test_retryable() {
        assert!(ClientError::Unreachable("x".into()).is_retryable());
        assert!(ClientError::Server {
            status: 503,
            detail: String::new()
        }
        .is_retryable());
        assert!(!ClientError::Server {
            status: 400,
            detail: String::new()
        }
        .is_retryable());
        assert!(!ClientError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!ClientError::invalid_request("x").is_retryable());
    }
}
