#![deny(unreachable_patterns)]
//! On-device face detection and face encoding.
//!
//! This crate provides:
//! - Anchor grid reconstruction for multi-stride detection heads
//! - Sigmoid decoding of raw detector output with confidence filtering
//! - Non-max suppression of overlapping face boxes
//! - Square face crops encoded under a byte budget (stepped quality search)
//! - Frame sources feeding the capture loop

pub mod detection;
pub mod encoder;
pub mod error;
pub mod source;

pub use detection::{
    non_max_suppression, preprocess, sigmoid, DecoderConfig, DetectionDecoder, FaceDetector,
    GridProposal, GridTable, InferenceRunner, ModelInput, RawOutputTensor,
};
#[cfg(feature = "onnx")]
pub use detection::OnnxRunner;
pub use encoder::{EncoderConfig, ImageEncoder, JpegCodec, LossyCodec, WebpCodec};
pub use error::{MediaError, MediaResult};
pub use source::{FrameSource, LocalFolderSource, StillFrameSource};
