//! Capture status published to the presentation layer.

use serde::{Deserialize, Serialize};

/// Current phase of the capture loop.
///
/// Transitions: `Initializing -> Idle`, `Idle <-> Detecting <-> Uploading`,
/// and `Error` from any state, recovered on the next successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    /// Waiting for the next scheduled cycle
    Idle,
    /// Loading the detector model
    #[default]
    Initializing,
    /// Running face detection and encoding on a frame
    Detecting,
    /// Waiting on the remote classifier
    Uploading,
    /// The last cycle (or initialization) failed
    Error,
}

impl CaptureStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureStatus::Idle => "idle",
            CaptureStatus::Initializing => "initializing",
            CaptureStatus::Detecting => "detecting",
            CaptureStatus::Uploading => "uploading",
            CaptureStatus::Error => "error",
        }
    }

    /// Whether a cycle is mid-flight in this state.
    pub fn is_active(&self) -> bool {
        matches!(self, CaptureStatus::Detecting | CaptureStatus::Uploading)
    }
}

impl std::fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
