//! Capture cycle state machine.
//!
//! One cycle: grab a frame, detect faces, encode the most prominent ones,
//! upload the batch. Cycles never overlap: a tick that finds a cycle still
//! running is skipped, not queued.
//!
//! Status moves `Initializing -> Idle`, then `Idle -> Detecting -> Uploading
//! -> Idle` per cycle, with `Error` reachable from any step and left again
//! by the next cycle that gets past frame acquisition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use image::RgbImage;
use tokio::sync::watch;
use tracing::{debug, Instrument, Span};

use emo_client::EmotionClassifier;
use emo_media::{FaceDetector, FrameSource, ImageEncoder};
use emo_models::{BoundingBox, CaptureStatus, EncodedImage};

use crate::error::{CaptureError, CaptureResult};
use crate::logging::CycleLogger;
use crate::metrics;
use crate::settings::CaptureSettings;
use crate::status::{StatusPublisher, StatusSnapshot};

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another cycle held the in-flight guard
    Busy,
    /// The frame source was not ready
    NoFrame,
    /// Nothing survived detection
    NoFaces,
    /// Every face failed to encode
    NothingEncoded,
    /// Upload succeeded
    Uploaded { faces: usize },
    /// Detection or upload failed; status is `Error`
    Failed { message: String },
}

impl CycleOutcome {
    /// Metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleOutcome::Busy => "busy",
            CycleOutcome::NoFrame => "no_frame",
            CycleOutcome::NoFaces => "no_faces",
            CycleOutcome::NothingEncoded => "nothing_encoded",
            CycleOutcome::Uploaded { .. } => "uploaded",
            CycleOutcome::Failed { .. } => "failed",
        }
    }
}

/// Holds the in-flight flag for the life of a cycle.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Sequences detection, encoding and upload for each capture cycle.
pub struct CaptureOrchestrator {
    source: Arc<dyn FrameSource>,
    detector: Arc<FaceDetector>,
    encoder: Arc<ImageEncoder>,
    classifier: Arc<dyn EmotionClassifier>,
    settings: watch::Receiver<CaptureSettings>,
    status: StatusPublisher,
    in_flight: AtomicBool,
    max_faces: usize,
}

impl CaptureOrchestrator {
    pub fn new(
        source: Arc<dyn FrameSource>,
        detector: Arc<FaceDetector>,
        encoder: Arc<ImageEncoder>,
        classifier: Arc<dyn EmotionClassifier>,
        settings: watch::Receiver<CaptureSettings>,
        max_faces: usize,
    ) -> Self {
        Self {
            source,
            detector,
            encoder,
            classifier,
            settings,
            status: StatusPublisher::new(),
            in_flight: AtomicBool::new(false),
            max_faces: max_faces.max(1),
        }
    }

    /// Prepare the detector and move from `Initializing` to `Idle`.
    pub fn initialize(&self) -> CaptureResult<()> {
        match self.detector.initialize() {
            Ok(()) => {
                self.status.set(CaptureStatus::Idle, None);
                Ok(())
            }
            Err(e) => {
                let err = CaptureError::from(e);
                self.status.fail(err.user_message());
                Err(err)
            }
        }
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    /// Whether a cycle currently holds the in-flight guard.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one capture cycle to completion.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Some(_guard) = InFlightGuard::try_acquire(&self.in_flight) else {
            metrics::record_cycle_skipped();
            return CycleOutcome::Busy;
        };

        metrics::record_cycle_started();
        let logger = CycleLogger::new();
        let span = logger.span();
        async {
            let outcome = self.run_guarded(&logger).await;
            logger.finished(&outcome);
            metrics::record_cycle_completed(outcome.as_str());
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run_guarded(&self, logger: &CycleLogger) -> CycleOutcome {
        let context = self.settings.borrow().context.clone();

        let Some(frame) = self.source.grab_frame().await else {
            return CycleOutcome::NoFrame;
        };
        let frame = Arc::new(frame);
        logger.frame(frame.width(), frame.height(), self.source.name());

        self.status.set(CaptureStatus::Detecting, None);
        let (detected, faces) = match self.detect(Arc::clone(&frame)).await {
            Ok(ranked) => ranked,
            Err(e) => return self.fail("detection", e),
        };
        logger.detected(detected, faces.len());
        if faces.is_empty() {
            self.status.set(CaptureStatus::Idle, None);
            return CycleOutcome::NoFaces;
        }
        metrics::record_faces_detected(faces.len());

        let images = self.encode_all(frame, &faces, logger).await;
        if images.is_empty() {
            self.status
                .set(CaptureStatus::Idle, Some("No face could be encoded".to_string()));
            return CycleOutcome::NothingEncoded;
        }

        self.status.set(CaptureStatus::Uploading, None);
        logger.uploading(images.len());

        let started = Instant::now();
        let result = self.classifier.classify(&images, &context).await;
        let elapsed = started.elapsed();
        metrics::record_upload(elapsed, result.is_ok());
        debug!(
            faces = images.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Upload finished"
        );

        match result {
            Ok(analysis) => {
                let faces = images.len();
                self.status.complete(faces, analysis);
                CycleOutcome::Uploaded { faces }
            }
            Err(e) => self.fail("upload", e.into()),
        }
    }

    /// Detect and rank faces, keeping at most `max_faces`.
    ///
    /// Returns the number detected along with the kept faces.
    async fn detect(&self, frame: Arc<RgbImage>) -> CaptureResult<(usize, Vec<BoundingBox>)> {
        let detector = Arc::clone(&self.detector);
        let span = Span::current();
        let mut faces = tokio::task::spawn_blocking(move || {
            span.in_scope(|| detector.detect(&frame))
        })
        .await
        .map_err(|e| CaptureError::Task(e.to_string()))??;
        let detected = faces.len();

        faces.sort_by(|a, b| {
            b.prominence()
                .partial_cmp(&a.prominence())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        faces.truncate(self.max_faces);
        Ok((detected, faces))
    }

    /// Encode every face on blocking threads; failed faces are dropped.
    ///
    /// Returns only after every encode has resolved, in ranking order.
    async fn encode_all(
        &self,
        frame: Arc<RgbImage>,
        faces: &[BoundingBox],
        logger: &CycleLogger,
    ) -> Vec<EncodedImage> {
        let tasks = faces.iter().map(|&face| {
            let encoder = Arc::clone(&self.encoder);
            let frame = Arc::clone(&frame);
            let span = Span::current();
            tokio::task::spawn_blocking(move || span.in_scope(|| encoder.encode(&frame, &face)))
        });

        let mut images = Vec::with_capacity(faces.len());
        for (i, joined) in join_all(tasks).await.into_iter().enumerate() {
            match joined {
                Ok(Ok(image)) => {
                    metrics::record_face_encoded(image.mime.as_str());
                    images.push(image);
                }
                Ok(Err(e)) => {
                    metrics::record_face_dropped();
                    logger.face_dropped(i, &e);
                }
                Err(e) => {
                    metrics::record_face_dropped();
                    logger.face_dropped(i, &e);
                }
            }
        }
        images
    }

    fn fail(&self, stage: &str, err: CaptureError) -> CycleOutcome {
        let message = err.user_message();
        metrics::record_cycle_failed(stage);
        self.status.fail(message.clone());
        CycleOutcome::Failed { message }
    }
}

impl std::fmt::Debug for CaptureOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureOrchestrator")
            .field("source", &self.source.name())
            .field("detector", &self.detector)
            .field("max_faces", &self.max_faces)
            .field("busy", &self.is_busy())
            .finish()
    }
}
