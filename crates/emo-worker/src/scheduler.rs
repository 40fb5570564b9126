//! Periodic capture trigger.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::orchestrator::{CaptureOrchestrator, CycleOutcome};
use crate::settings::CaptureSettings;

/// Longest wait for an in-flight cycle on shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

/// Fires a capture cycle every period while capture is enabled.
///
/// Each cycle runs as its own task, so a slow cycle never delays the
/// ticker; ticks that land on a running cycle are turned away by the
/// orchestrator's in-flight guard.
pub struct CaptureScheduler {
    orchestrator: Arc<CaptureOrchestrator>,
    settings: watch::Receiver<CaptureSettings>,
    period: Duration,
}

impl CaptureScheduler {
    pub fn new(
        orchestrator: Arc<CaptureOrchestrator>,
        settings: watch::Receiver<CaptureSettings>,
        period: Duration,
    ) -> Self {
        Self {
            orchestrator,
            settings,
            period,
        }
    }

    /// Tick until `shutdown` turns true or its sender goes away, then wait
    /// for the running cycle to finish.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(period = ?self.period, "Capture scheduler started");

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles: JoinSet<CycleOutcome> = JoinSet::new();
        let mut enabled = self.settings.borrow().enabled;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown signal received, stopping scheduler");
                        break;
                    }
                }
                Ok(()) = self.settings.changed() => {
                    let now_enabled = self.settings.borrow_and_update().enabled;
                    if now_enabled != enabled {
                        info!(enabled = now_enabled, "Capture toggled");
                        enabled = now_enabled;
                        if enabled {
                            interval.reset_immediately();
                        }
                    }
                }
                _ = interval.tick() => {
                    if !enabled {
                        continue;
                    }
                    let orchestrator = Arc::clone(&self.orchestrator);
                    cycles.spawn(async move { orchestrator.run_cycle().await });
                }
                Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                    match joined {
                        Ok(outcome) => debug!(outcome = outcome.as_str(), "Cycle finished"),
                        Err(e) => warn!(error = %e, "Cycle task aborted"),
                    }
                }
            }
        }

        if !cycles.is_empty() {
            info!("Waiting for in-flight cycle to complete...");
            let drain = async { while cycles.join_next().await.is_some() {} };
            if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
                warn!("In-flight cycle did not finish in time, aborting");
                cycles.abort_all();
            }
        }

        info!("Capture scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use emo_client::{ClientResult, EmotionClassifier};
    use emo_media::{
        DecoderConfig, EncoderConfig, FaceDetector, FrameSource, ImageEncoder, InferenceRunner,
        MediaResult, ModelInput, RawOutputTensor,
    };
    use emo_models::{AnalysisResponse, EncodedImage};
    use image::RgbImage;

    /// Counts grabs and never has a frame.
    struct CountingSource(Arc<AtomicUsize>);

    #[async_trait]
    impl FrameSource for CountingSource {
        async fn grab_frame(&self) -> Option<RgbImage> {
            self.0.fetch_add(1, Ordering::SeqCst);
            None
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    struct UnusedRunner;

    impl InferenceRunner for UnusedRunner {
        fn input_size(&self) -> (u32, u32) {
            (32, 32)
        }

        fn run(&self, _input: &ModelInput) -> MediaResult<RawOutputTensor> {
            RawOutputTensor::from_shape(&[5, 1], vec![0.0; 5])
        }

        fn name(&self) -> &str {
            "unused"
        }
    }

    struct UnusedClassifier;

    #[async_trait]
    impl EmotionClassifier for UnusedClassifier {
        async fn classify(
            &self,
            _images: &[EncodedImage],
            _context: &str,
        ) -> ClientResult<AnalysisResponse> {
            unreachable!("no frames are ever produced")
        }
    }

    fn scheduler(
        enabled: bool,
        period: Duration,
    ) -> (
        CaptureScheduler,
        Arc<AtomicUsize>,
        watch::Sender<CaptureSettings>,
    ) {
        let grabs = Arc::new(AtomicUsize::new(0));
        let (settings_tx, settings_rx) = watch::channel(CaptureSettings {
            enabled,
            context: String::new(),
        });
        let detector = FaceDetector::new(
            Arc::new(UnusedRunner),
            DecoderConfig {
                strides: vec![32],
                ..Default::default()
            },
        );
        let orchestrator = Arc::new(CaptureOrchestrator::new(
            Arc::new(CountingSource(Arc::clone(&grabs))),
            Arc::new(detector),
            Arc::new(ImageEncoder::new(EncoderConfig::default())),
            Arc::new(UnusedClassifier),
            settings_rx.clone(),
            8,
        ));
        (
            CaptureScheduler::new(orchestrator, settings_rx, period),
            grabs,
            settings_tx,
        )
    }

    #[tokio::test]
    async fn test_ticks_while_enabled_and_stops_on_shutdown() {
        let (scheduler, grabs, _settings) = scheduler(true, Duration::from_millis(20));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(scheduler.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(150)).await;
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert!(grabs.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_disabled_schedules_nothing_until_enabled() {
        let (scheduler, grabs, settings) = scheduler(false, Duration::from_millis(20));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(scheduler.run(shutdown_rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(grabs.load(Ordering::SeqCst), 0);

        settings.send_modify(|s| s.enabled = true);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(grabs.load(Ordering::SeqCst) >= 1);

        settings.send_modify(|s| s.enabled = false);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let paused_at = grabs.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(grabs.load(Ordering::SeqCst), paused_at);

        drop(shutdown_tx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
