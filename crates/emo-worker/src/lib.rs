//! Face capture and emotion upload loop.
//!
//! On every tick the orchestrator grabs a frame, detects faces on-device,
//! encodes the most prominent ones under the upload budget and sends them
//! to the classification service, publishing status as it goes.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod scheduler;
pub mod settings;
pub mod status;

pub use config::CaptureConfig;
pub use error::{CaptureError, CaptureResult};
pub use logging::CycleLogger;
pub use orchestrator::{CaptureOrchestrator, CycleOutcome};
pub use scheduler::CaptureScheduler;
pub use settings::{CaptureSettings, SettingsStore};
pub use status::{StatusPublisher, StatusSnapshot};
