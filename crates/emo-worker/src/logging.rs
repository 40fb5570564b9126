//! Structured cycle logging.
//!
//! Every capture cycle gets a short random id carried by a `capture_cycle`
//! span. Events inside the cycle tag the pipeline stage they come from, so
//! one cycle can be followed from frame grab to upload.

use std::fmt::Display;

use tracing::{error, info, warn, Span};
use uuid::Uuid;

use crate::orchestrator::CycleOutcome;

/// Pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStage {
    Frame,
    Detect,
    Encode,
    Upload,
}

impl CycleStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStage::Frame => "frame",
            CycleStage::Detect => "detect",
            CycleStage::Encode => "encode",
            CycleStage::Upload => "upload",
        }
    }
}

/// Logger for one capture cycle.
#[derive(Debug, Clone)]
pub struct CycleLogger {
    cycle_id: String,
    span: Span,
}

impl CycleLogger {
    /// Logger for a new cycle with a fresh 8 character id.
    pub fn new() -> Self {
        let id = Uuid::new_v4().simple().to_string();
        let cycle_id = id[..8].to_string();
        let span = tracing::info_span!("capture_cycle", cycle_id = %cycle_id);
        Self { cycle_id, span }
    }

    pub fn cycle_id(&self) -> &str {
        &self.cycle_id
    }

    /// Span to instrument the cycle's futures and blocking work with.
    pub fn span(&self) -> Span {
        self.span.clone()
    }

    pub fn frame(&self, width: u32, height: u32, source: &str) {
        info!(
            stage = CycleStage::Frame.as_str(),
            width,
            height,
            source,
            "Frame acquired"
        );
    }

    /// `detected` faces survived decoding, `kept` of them are encoded.
    pub fn detected(&self, detected: usize, kept: usize) {
        info!(
            stage = CycleStage::Detect.as_str(),
            detected,
            kept,
            "Faces detected"
        );
    }

    pub fn face_dropped(&self, index: usize, reason: &dyn Display) {
        warn!(
            stage = CycleStage::Encode.as_str(),
            face = index,
            reason = %reason,
            "Face dropped"
        );
    }

    pub fn uploading(&self, faces: usize) {
        info!(stage = CycleStage::Upload.as_str(), faces, "Uploading faces");
    }

    /// Final event of a cycle.
    pub fn finished(&self, outcome: &CycleOutcome) {
        match outcome {
            CycleOutcome::Uploaded { faces } => {
                info!(outcome = outcome.as_str(), faces, "Cycle completed")
            }
            CycleOutcome::Failed { message } => {
                error!(outcome = outcome.as_str(), "Cycle failed: {}", message)
            }
            other => info!(outcome = other.as_str(), "Cycle ended early"),
        }
    }
}

impl Default for CycleLogger {
    fn default() -> Self {
        Self::new()
    }
}
