//! Inference seam and the face detector built on it.

use std::sync::{Arc, OnceLock};

use image::{imageops::FilterType, RgbImage};
use tracing::{debug, info};

use emo_models::BoundingBox;

use super::decoder::{DecoderConfig, DetectionDecoder};
use super::tensor::RawOutputTensor;
use crate::error::{MediaError, MediaResult};

/// Normalized NCHW input for a single frame.
#[derive(Debug, Clone)]
pub struct ModelInput {
    pub width: u32,
    pub height: u32,
    /// `[1, 3, height, width]`, values in [0, 1]
    pub data: Vec<f32>,
}

impl ModelInput {
    /// Tensor shape as the runtime expects it.
    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.height as usize, self.width as usize]
    }
}

/// A forward pass of the detector model.
///
/// Implementations must be safe to call from blocking worker threads.
pub trait InferenceRunner: Send + Sync {
    /// Model input `(width, height)`.
    fn input_size(&self) -> (u32, u32);

    /// Run the model on one preprocessed frame.
    fn run(&self, input: &ModelInput) -> MediaResult<RawOutputTensor>;

    /// Runner name for logging.
    fn name(&self) -> &str;
}

/// Resize to the model input and convert HWC u8 to CHW f32 in [0, 1].
pub fn preprocess(frame: &RgbImage, width: u32, height: u32) -> ModelInput {
    let resized = image::imageops::resize(frame, width, height, FilterType::Triangle);
    let (w, h) = (width as usize, height as usize);

    let mut data: Vec<f32> = Vec::with_capacity(3 * h * w);
    for c in 0..3 {
        for y in 0..height {
            for x in 0..width {
                data.push(resized.get_pixel(x, y)[c] as f32 / 255.0);
            }
        }
    }

    ModelInput {
        width,
        height,
        data,
    }
}

/// Face detector: preprocess, run, decode.
///
/// Unusable until [`FaceDetector::initialize`] has built the decoder for the
/// runner's input shape.
pub struct FaceDetector {
    runner: Arc<dyn InferenceRunner>,
    config: DecoderConfig,
    decoder: OnceLock<DetectionDecoder>,
}

impl FaceDetector {
    /// Create a detector. Model dimensions in `config` are replaced by the
    /// runner's input size on initialization.
    pub fn new(runner: Arc<dyn InferenceRunner>, config: DecoderConfig) -> Self {
        Self {
            runner,
            config,
            decoder: OnceLock::new(),
        }
    }

    /// Build the anchor grid. Safe to call more than once.
    pub fn initialize(&self) -> MediaResult<()> {
        if self.decoder.get().is_some() {
            return Ok(());
        }

        let (model_width, model_height) = self.runner.input_size();
        let decoder = DetectionDecoder::new(DecoderConfig {
            model_width,
            model_height,
            ..self.config.clone()
        })?;

        info!(
            runner = self.runner.name(),
            width = model_width,
            height = model_height,
            proposals = decoder.grid().len(),
            "Face detector initialized"
        );

        // A concurrent initializer built the same grid.
        let _ = self.decoder.set(decoder);
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.decoder.get().is_some()
    }

    /// Detect faces in a frame, boxes in frame pixel space.
    pub fn detect(&self, frame: &RgbImage) -> MediaResult<Vec<BoundingBox>> {
        let decoder = self.decoder.get().ok_or(MediaError::NotReady)?;
        if frame.width() == 0 || frame.height() == 0 {
            return Err(MediaError::invalid_region("empty frame"));
        }

        let config = decoder.config();
        let input = preprocess(frame, config.model_width, config.model_height);
        let output = self.runner.run(&input)?;
        let faces = decoder.decode(&output, frame.width(), frame.height())?;

        debug!(count = faces.len(), "Face detection completed");
        Ok(faces)
    }
}

impl std::fmt::Debug for FaceDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaceDetector")
            .field("runner", &self.runner.name())
            .field("ready", &self.is_ready())
            .finish()
    }
}
