//! Capture loop configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use emo_client::{ClientConfig, MAX_BATCH};
use emo_media::{DecoderConfig, EncoderConfig};

use crate::error::{CaptureError, CaptureResult};

/// Capture loop configuration.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Time between capture cycles
    pub period: Duration,
    /// Most faces uploaded per cycle
    pub max_faces: usize,
    /// Detector model file
    pub model_path: PathBuf,
    /// Detector input width and height
    pub model_input: (u32, u32),
    /// Output tensor to read, when the model does not use the default name
    pub model_output: Option<String>,
    /// Directory the frame source reads stills from
    pub frames_dir: PathBuf,
    /// Persisted `{ enabled, context }` settings file
    pub settings_path: PathBuf,
    /// How often the settings file is re-read
    pub settings_poll: Duration,
    /// Prometheus listener address, if metrics are exported
    pub metrics_addr: Option<SocketAddr>,
    /// Startup override of the persisted enabled flag
    pub enabled_override: Option<bool>,
    /// Startup override of the persisted context
    pub context_override: Option<String>,
    pub decoder: DecoderConfig,
    pub encoder: EncoderConfig,
    pub client: ClientConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(10),
            max_faces: 8,
            model_path: PathBuf::from("models/face_detector.onnx"),
            model_input: (640, 640),
            model_output: None,
            frames_dir: PathBuf::from("frames"),
            settings_path: PathBuf::from("capture_settings.json"),
            settings_poll: Duration::from_secs(2),
            metrics_addr: None,
            enabled_override: None,
            context_override: None,
            decoder: DecoderConfig::default(),
            encoder: EncoderConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl CaptureConfig {
    /// Create config from environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let model_size = env_parse("CAPTURE_MODEL_SIZE").unwrap_or(defaults.model_input.0);

        let decoder = DecoderConfig {
            model_width: model_size,
            model_height: model_size,
            confidence_threshold: env_parse("CAPTURE_CONFIDENCE_THRESHOLD")
                .unwrap_or(defaults.decoder.confidence_threshold),
            nms_threshold: env_parse("CAPTURE_NMS_THRESHOLD")
                .unwrap_or(defaults.decoder.nms_threshold),
            ..defaults.decoder
        };

        let encoder = EncoderConfig {
            max_bytes: env_parse("CAPTURE_MAX_IMAGE_BYTES").unwrap_or(defaults.encoder.max_bytes),
            min_quality: env_parse("CAPTURE_MIN_QUALITY").unwrap_or(defaults.encoder.min_quality),
            ..defaults.encoder
        };

        Self {
            period: env_parse("CAPTURE_PERIOD_SECS")
                .filter(|&secs: &u64| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.period),
            max_faces: env_parse("CAPTURE_MAX_FACES")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.max_faces),
            model_path: env_path("CAPTURE_MODEL_PATH").unwrap_or(defaults.model_path),
            model_input: (model_size, model_size),
            model_output: env_string("CAPTURE_MODEL_OUTPUT"),
            frames_dir: env_path("CAPTURE_FRAMES_DIR").unwrap_or(defaults.frames_dir),
            settings_path: env_path("CAPTURE_SETTINGS_PATH").unwrap_or(defaults.settings_path),
            settings_poll: env_parse("CAPTURE_SETTINGS_POLL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.settings_poll),
            metrics_addr: env_parse("CAPTURE_METRICS_ADDR"),
            enabled_override: env_parse("CAPTURE_ENABLED"),
            context_override: std::env::var("CAPTURE_CONTEXT").ok(),
            decoder,
            encoder,
            client: ClientConfig::from_env(),
        }
    }

    /// Reject combinations the capture loop cannot run with.
    pub fn validate(&self) -> CaptureResult<()> {
        if self.max_faces == 0 || self.max_faces > MAX_BATCH {
            return Err(CaptureError::config(format!(
                "max_faces must be within 1..={}, got {}",
                MAX_BATCH, self.max_faces
            )));
        }
        if self.model_input.0 == 0 || self.model_input.1 == 0 {
            return Err(CaptureError::config("model input size must be positive"));
        }
        if self.period.is_zero() || self.settings_poll.is_zero() {
            return Err(CaptureError::config(
                "capture period and settings poll interval must be positive",
            ));
        }
        if self.encoder.min_quality == 0 || self.encoder.min_quality > 100 {
            return Err(CaptureError::config(format!(
                "min_quality must be within 1..=100, got {}",
                self.encoder.min_quality
            )));
        }
        if self.encoder.max_bytes == 0 {
            return Err(CaptureError::config("max image bytes must be positive"));
        }
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}
