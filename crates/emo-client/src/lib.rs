//! Client for the remote emotion classification service.
//!
//! The service accepts a multipart batch of face crops plus free-text
//! context and answers with per-face top-3 emotions, an aggregate top-3
//! and a feedback string.

pub mod client;
pub mod error;

pub use client::{ClassifierClient, ClientConfig, EmotionClassifier, MAX_BATCH, MAX_IMAGE_BYTES};
pub use error::{ClientError, ClientResult};
