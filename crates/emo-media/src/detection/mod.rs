//! Face detection for the capture loop.
//!
//! The detector model is a single-head, multi-stride network whose output is
//! one channel-major tensor `[channels, proposals]`:
//!
//! | Channel | Meaning |
//! |---------|---------|
//! | 0..4 | box x, y, w, h offsets (logits) |
//! | 4 | objectness (logit) |
//! | 5.. | per-class scores (logits), absent for single-class models |
//!
//! Proposals are ordered stride by stride, each stride's cells in raster
//! order, matching [`GridTable`].

pub mod decoder;
pub mod grid;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod runner;
pub mod tensor;

pub use decoder::{
    non_max_suppression, sigmoid, DecoderConfig, DetectionDecoder, CONFIDENCE_THRESHOLD,
    NMS_THRESHOLD,
};
pub use grid::{GridProposal, GridTable};
#[cfg(feature = "onnx")]
pub use onnx::OnnxRunner;
pub use runner::{preprocess, FaceDetector, InferenceRunner, ModelInput};
pub use tensor::RawOutputTensor;
