//! Capture status broadcast.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use emo_models::{AnalysisResponse, CaptureStatus};

/// What observers see of the capture loop.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSnapshot {
    pub status: CaptureStatus,
    /// Human-readable detail, set on errors and transitions
    pub message: Option<String>,
    /// Faces sent in the last successful upload
    pub faces: usize,
    /// Last successful analysis
    pub analysis: Option<AnalysisResponse>,
    pub last_completed_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Publishes status snapshots over a watch channel.
///
/// Receivers always see the latest snapshot; intermediate ones may be
/// skipped.
#[derive(Debug)]
pub struct StatusPublisher {
    tx: watch::Sender<StatusSnapshot>,
}

impl StatusPublisher {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(StatusSnapshot::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }

    pub fn status(&self) -> CaptureStatus {
        self.tx.borrow().status
    }

    /// Move to `status`, replacing the message.
    pub fn set(&self, status: CaptureStatus, message: Option<String>) {
        self.tx.send_modify(|s| {
            s.status = status;
            s.message = message;
            s.updated_at = Some(Utc::now());
        });
    }

    /// Enter `Error` with a user-facing message.
    pub fn fail(&self, message: impl Into<String>) {
        self.set(CaptureStatus::Error, Some(message.into()));
    }

    /// Record a successful upload and return to `Idle`.
    pub fn complete(&self, faces: usize, analysis: AnalysisResponse) {
        let now = Utc::now();
        self.tx.send_modify(|s| {
            s.status = CaptureStatus::Idle;
            s.message = None;
            s.faces = faces;
            s.analysis = Some(analysis);
            s.last_completed_at = Some(now);
            s.updated_at = Some(now);
        });
    }
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}
