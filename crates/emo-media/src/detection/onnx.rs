//! ONNX Runtime backed detector runner.

use std::path::Path;
use std::sync::Mutex;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::info;

use super::runner::{InferenceRunner, ModelInput};
use super::tensor::RawOutputTensor;
use crate::error::{MediaError, MediaResult};

/// Output tensor name of exported detector graphs.
const DEFAULT_OUTPUT: &str = "output0";

/// Runs the face detector model through an ONNX Runtime session.
pub struct OnnxRunner {
    session: Mutex<Session>,
    input_width: u32,
    input_height: u32,
    output_name: String,
}

impl OnnxRunner {
    /// Load a model from disk.
    pub fn load(
        model_path: impl AsRef<Path>,
        input_width: u32,
        input_height: u32,
    ) -> MediaResult<Self> {
        let model_path = model_path.as_ref();
        if !model_path.exists() {
            return Err(MediaError::model_not_found(model_path.display().to_string()));
        }

        let model_bytes = std::fs::read(model_path)?;
        let session = Session::builder()
            .map_err(|e| {
                MediaError::inference_failed(format!("Failed to create session builder: {}", e))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                MediaError::inference_failed(format!("Failed to set optimization level: {}", e))
            })?
            .commit_from_memory(&model_bytes)
            .map_err(|e| MediaError::inference_failed(format!("Failed to load model: {}", e)))?;

        let output_name = DEFAULT_OUTPUT.to_string();

        info!(
            model_path = %model_path.display(),
            input_width,
            input_height,
            output = %output_name,
            "Detector model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_width,
            input_height,
            output_name,
        })
    }

    /// Read a differently named output tensor.
    pub fn with_output_name(mut self, name: impl Into<String>) -> Self {
        self.output_name = name.into();
        self
    }
}

impl InferenceRunner for OnnxRunner {
    fn input_size(&self) -> (u32, u32) {
        (self.input_width, self.input_height)
    }

    fn run(&self, input: &ModelInput) -> MediaResult<RawOutputTensor> {
        if (input.width, input.height) != self.input_size() {
            return Err(MediaError::shape_mismatch(format!(
                "input {}x{} does not match model {}x{}",
                input.width, input.height, self.input_width, self.input_height
            )));
        }

        let shape = input.shape().to_vec();
        let tensor: Value = Tensor::from_array((shape, input.data.clone().into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::inference_failed(format!("Failed to create tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::inference_failed("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| MediaError::inference_failed(format!("ONNX inference failed: {}", e)))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            MediaError::inference_failed(format!("Missing {} tensor", self.output_name))
        })?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::inference_failed(format!("Failed to extract tensor: {}", e)))?;

        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        RawOutputTensor::from_shape(&dims, data.to_vec())
    }

    fn name(&self) -> &str {
        "onnx"
    }
}
