//! Error types for detection and encoding.

use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while detecting or encoding faces.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Tensor shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Face detector not initialized")]
    NotReady,

    #[error("Encoded image exceeds {max_bytes} byte budget (smallest attempt {smallest} bytes)")]
    SizeExceeded { max_bytes: usize, smallest: usize },

    #[error("Encoding failed: {0}")]
    EncodeFailed(String),

    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl MediaError {
    /// Create a shape mismatch error.
    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Self::ShapeMismatch(message.into())
    }

    /// Create an encoding failure error.
    pub fn encode_failed(message: impl Into<String>) -> Self {
        Self::EncodeFailed(message.into())
    }

    /// Create an invalid region error.
    pub fn invalid_region(message: impl Into<String>) -> Self {
        Self::InvalidRegion(message.into())
    }

    /// Create an inference failure error.
    pub fn inference_failed(message: impl Into<String>) -> Self {
        Self::InferenceFailed(message.into())
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::ModelNotFound(path.into())
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Per-face failures the capture loop drops instead of failing the cycle.
    pub fn is_per_face(&self) -> bool {
        matches!(
            self,
            MediaError::SizeExceeded { .. }
                | MediaError::EncodeFailed(_)
                | MediaError::InvalidRegion(_)
        )
    }
}
