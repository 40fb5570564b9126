//! Square face crops compressed under a byte budget.
//!
//! Each face is cropped to a square around its box, resized to the
//! classifier's input resolution and encoded with a stepped quality search:
//! the primary lossy format is tried from `quality_start` downwards and, if
//! nothing fits, the alternate format gets the same ladder.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ColorType, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use emo_models::{BoundingBox, EncodedImage, ImageMime};

use crate::error::{MediaError, MediaResult};

/// Configuration for face encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Output square side in pixels
    pub target_size: u32,
    /// Byte budget per encoded face
    pub max_bytes: usize,
    /// First quality tried (percent)
    pub quality_start: u8,
    /// Quality decrement per attempt
    pub quality_step: u8,
    /// Lowest quality tried (inclusive)
    pub min_quality: u8,
    /// Retry with the alternate format when the primary never fits
    pub allow_fallback: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            target_size: 128,
            max_bytes: 300 * 1024,
            quality_start: 92,
            quality_step: 10,
            min_quality: 25,
            allow_fallback: true,
        }
    }
}

impl EncoderConfig {
    /// Quality levels in the order they are attempted.
    pub fn quality_ladder(&self) -> Vec<u8> {
        let min = self.min_quality.clamp(1, 100);
        let step = self.quality_step.max(1);
        let mut q = self.quality_start.clamp(min, 100);

        let mut ladder = vec![q];
        while q > min {
            q = q.saturating_sub(step).max(min);
            ladder.push(q);
        }
        ladder
    }
}

/// A lossy image format with a quality knob.
pub trait LossyCodec: Send + Sync {
    fn mime(&self) -> ImageMime;

    /// Encode at `quality` percent.
    fn encode(&self, image: &RgbImage, quality: u8) -> MediaResult<Vec<u8>>;
}

/// Lossy WebP via libwebp.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebpCodec;

impl LossyCodec for WebpCodec {
    fn mime(&self) -> ImageMime {
        ImageMime::Webp
    }

    fn encode(&self, image: &RgbImage, quality: u8) -> MediaResult<Vec<u8>> {
        let encoder = webp::Encoder::from_rgb(image.as_raw(), image.width(), image.height());
        let memory = encoder
            .encode_simple(false, quality as f32)
            .map_err(|e| MediaError::encode_failed(format!("WebP: {:?}", e)))?;
        Ok(memory.to_vec())
    }
}

/// Baseline JPEG via the image crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCodec;

impl LossyCodec for JpegCodec {
    fn mime(&self) -> ImageMime {
        ImageMime::Jpeg
    }

    fn encode(&self, image: &RgbImage, quality: u8) -> MediaResult<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        encoder
            .encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
            .map_err(|e| MediaError::encode_failed(format!("JPEG: {}", e)))?;
        Ok(buffer)
    }
}

/// Outcome of one format's quality search.
enum Search {
    Fits(EncodedImage),
    /// Smallest blob seen, in bytes
    Oversized(usize),
}

/// Encodes detected faces into budget-compliant blobs.
pub struct ImageEncoder {
    config: EncoderConfig,
    primary: Box<dyn LossyCodec>,
    alternate: Box<dyn LossyCodec>,
}

impl ImageEncoder {
    /// WebP first, JPEG as the alternate.
    pub fn new(config: EncoderConfig) -> Self {
        Self::with_codecs(config, Box::new(WebpCodec), Box::new(JpegCodec))
    }

    pub fn with_codecs(
        config: EncoderConfig,
        primary: Box<dyn LossyCodec>,
        alternate: Box<dyn LossyCodec>,
    ) -> Self {
        Self {
            config,
            primary,
            alternate,
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Crop `face` out of `frame` and encode it.
    pub fn encode(&self, frame: &RgbImage, face: &BoundingBox) -> MediaResult<EncodedImage> {
        let crop = square_crop(frame, face)?;
        let side = self.config.target_size.max(1);
        let resized = imageops::resize(&crop, side, side, FilterType::Lanczos3);
        self.encode_prepared(&resized)
    }

    /// Run the quality search on an already square, resized image.
    pub fn encode_prepared(&self, image: &RgbImage) -> MediaResult<EncodedImage> {
        let ladder = self.config.quality_ladder();

        let primary_smallest = match self.search(self.primary.as_ref(), image, &ladder) {
            Ok(Search::Fits(encoded)) => return Ok(encoded),
            Ok(Search::Oversized(smallest)) => Some(smallest),
            Err(e) if self.config.allow_fallback => {
                warn!(
                    codec = %self.primary.mime(),
                    error = %e,
                    "Primary encoder failed, trying alternate"
                );
                None
            }
            Err(e) => return Err(e),
        };

        let exceeded = |smallest: Option<usize>| MediaError::SizeExceeded {
            max_bytes: self.config.max_bytes,
            smallest: smallest.unwrap_or(0),
        };

        if !self.config.allow_fallback {
            return Err(exceeded(primary_smallest));
        }

        match self.search(self.alternate.as_ref(), image, &ladder)? {
            Search::Fits(encoded) => Ok(encoded),
            Search::Oversized(smallest) => {
                let smallest = primary_smallest.map_or(smallest, |p| p.min(smallest));
                Err(exceeded(Some(smallest)))
            }
        }
    }

    fn search(
        &self,
        codec: &dyn LossyCodec,
        image: &RgbImage,
        ladder: &[u8],
    ) -> MediaResult<Search> {
        let mut smallest = usize::MAX;

        for &quality in ladder {
            let blob = codec.encode(image, quality)?;
            let size = blob.len();
            if size <= self.config.max_bytes {
                debug!(
                    codec = %codec.mime(),
                    quality,
                    size,
                    max_bytes = self.config.max_bytes,
                    "Face encoded within budget"
                );
                return Ok(Search::Fits(EncodedImage::new(
                    blob,
                    codec.mime(),
                    image.width(),
                    quality,
                )));
            }
            smallest = smallest.min(size);
        }

        debug!(
            codec = %codec.mime(),
            smallest,
            max_bytes = self.config.max_bytes,
            "No quality level fits the budget"
        );
        Ok(Search::Oversized(smallest))
    }
}

impl std::fmt::Debug for ImageEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageEncoder")
            .field("config", &self.config)
            .field("primary", &self.primary.mime())
            .field("alternate", &self.alternate.mime())
            .finish()
    }
}

/// Square region centered on `face`, shifted to stay inside the frame.
///
/// The side is the longer box edge, capped at the shorter frame edge.
fn square_crop(frame: &RgbImage, face: &BoundingBox) -> MediaResult<RgbImage> {
    let (fw, fh) = frame.dimensions();
    if fw == 0 || fh == 0 {
        return Err(MediaError::invalid_region("empty frame"));
    }
    let geometry = [face.x, face.y, face.width, face.height];
    if geometry.iter().any(|v| !v.is_finite()) || face.width <= 0.0 || face.height <= 0.0 {
        return Err(MediaError::invalid_region(format!("degenerate face box {:?}", face)));
    }

    let side = (face.width.max(face.height).round() as u32).clamp(1, fw.min(fh));
    let half = side as f32 / 2.0;
    let left = ((face.cx() - half).round().max(0.0) as u32).min(fw - side);
    let top = ((face.cy() - half).round().max(0.0) as u32).min(fh - side);

    Ok(imageops::crop_imm(frame, left, top, side, side).to_image())
}
