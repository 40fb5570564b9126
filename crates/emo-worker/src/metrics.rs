//! Capture loop metrics.
//!
//! Counters and histograms recorded through the `metrics` facade; exported
//! by whichever recorder the binary installs.

use std::time::Duration;

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Cycles that acquired the in-flight guard.
    pub const CYCLES_STARTED: &str = "emo_capture_cycles_started_total";

    /// Cycles that ended, by outcome.
    pub const CYCLES_COMPLETED: &str = "emo_capture_cycles_completed_total";

    /// Cycles that ended in the error state, by stage.
    pub const CYCLES_FAILED: &str = "emo_capture_cycles_failed_total";

    /// Ticks skipped because a cycle was still running.
    pub const CYCLES_SKIPPED: &str = "emo_capture_cycles_skipped_total";

    /// Faces kept after suppression and ranking.
    pub const FACES_DETECTED: &str = "emo_capture_faces_detected_total";

    /// Faces encoded within the byte budget, by format.
    pub const FACES_ENCODED: &str = "emo_capture_faces_encoded_total";

    /// Faces dropped because encoding failed.
    pub const FACES_DROPPED: &str = "emo_capture_faces_dropped_total";

    /// Upload round-trip in seconds, by result.
    pub const UPLOAD_DURATION_SECONDS: &str = "emo_capture_upload_duration_seconds";
}

pub fn record_cycle_started() {
    counter!(names::CYCLES_STARTED).increment(1);
}

/// Record a finished cycle by outcome label.
pub fn record_cycle_completed(outcome: &str) {
    counter!(names::CYCLES_COMPLETED, "outcome" => outcome.to_string()).increment(1);
}

pub fn record_cycle_failed(stage: &str) {
    counter!(names::CYCLES_FAILED, "stage" => stage.to_string()).increment(1);
}

pub fn record_cycle_skipped() {
    counter!(names::CYCLES_SKIPPED).increment(1);
}

pub fn record_faces_detected(count: usize) {
    counter!(names::FACES_DETECTED).increment(count as u64);
}

pub fn record_face_encoded(mime: &str) {
    counter!(names::FACES_ENCODED, "mime" => mime.to_string()).increment(1);
}

pub fn record_face_dropped() {
    counter!(names::FACES_DROPPED).increment(1);
}

/// Record an upload attempt.
pub fn record_upload(duration: Duration, success: bool) {
    let result = if success { "success" } else { "error" };
    histogram!(names::UPLOAD_DURATION_SECONDS, "result" => result).record(duration.as_secs_f64());
}
