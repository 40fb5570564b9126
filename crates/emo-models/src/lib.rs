//! Shared data models for the emotion capture pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Face bounding boxes produced by the on-device detector
//! - Encoded face images handed to the upload step
//! - Capture status published to the presentation layer
//! - Emotion classification results returned by the remote service

pub mod capture_status;
pub mod emotion;
pub mod image;
pub mod rect;

// Re-export common types
pub use capture_status::CaptureStatus;
pub use emotion::{AnalysisResponse, EmotionLabel, EmotionScore, ImageResult};
pub use image::{EncodedImage, ImageMime};
pub use rect::BoundingBox;
