//! Encoded face crops ready for upload.

use serde::{Deserialize, Serialize};

/// Lossy image formats the encoder may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageMime {
    Webp,
    Jpeg,
}

impl ImageMime {
    /// MIME type sent with the multipart upload.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageMime::Webp => "image/webp",
            ImageMime::Jpeg => "image/jpeg",
        }
    }

    /// File extension used for upload part names.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageMime::Webp => "webp",
            ImageMime::Jpeg => "jpg",
        }
    }
}

impl std::fmt::Display for ImageMime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A compressed square face crop.
///
/// `size_bytes` never exceeds the byte budget it was encoded against; the
/// encoder fails instead of returning an oversized blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Compressed image bytes
    pub blob: Vec<u8>,
    /// Format of `blob`
    pub mime: ImageMime,
    /// Output width (equals the target square size)
    pub width: u32,
    /// Output height (equals the target square size)
    pub height: u32,
    /// Length of `blob`
    pub size_bytes: usize,
    /// Quality level the blob was encoded at (percent)
    pub quality: u8,
}

impl EncodedImage {
    /// Wrap encoder output, deriving `size_bytes` from the blob.
    pub fn new(blob: Vec<u8>, mime: ImageMime, side: u32, quality: u8) -> Self {
        let size_bytes = blob.len();
        Self {
            blob,
            mime,
            width: side,
            height: side,
            size_bytes,
            quality,
        }
    }

    /// Upload file name for the face at `index`.
    pub fn file_name(&self, index: usize) -> String {
        format!("face_{}.{}", index, self.mime.extension())
    }
}
