//! Frame sources for the capture loop.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use image::RgbImage;
use tracing::{debug, warn};

/// Still-image extensions a folder source picks up.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp"];

/// Provides the latest video frame.
#[async_trait]
pub trait FrameSource: Send + Sync {
    /// Current frame, or `None` while the source is not ready.
    async fn grab_frame(&self) -> Option<RgbImage>;

    /// Source name for logging.
    fn name(&self) -> &str;
}

/// Cycles through the still images of a directory.
///
/// The directory is re-listed on every grab so frames dropped in while the
/// loop runs are picked up.
#[derive(Debug)]
pub struct LocalFolderSource {
    dir: PathBuf,
    cursor: AtomicUsize,
}

impl LocalFolderSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn list_images(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut images = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if is_image(&path) {
                images.push(path);
            }
        }
        images.sort();
        Ok(images)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[async_trait]
impl FrameSource for LocalFolderSource {
    async fn grab_frame(&self) -> Option<RgbImage> {
        let images = match self.list_images().await {
            Ok(images) => images,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Frame directory unreadable");
                return None;
            }
        };
        if images.is_empty() {
            debug!(dir = %self.dir.display(), "No frames available");
            return None;
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % images.len();
        let path = &images[index];

        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read frame");
                return None;
            }
        };

        match image::load_from_memory(&bytes) {
            Ok(img) => {
                let frame = img.to_rgb8();
                if frame.width() == 0 || frame.height() == 0 {
                    return None;
                }
                debug!(
                    path = %path.display(),
                    width = frame.width(),
                    height = frame.height(),
                    "Frame loaded"
                );
                Some(frame)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to decode frame");
                None
            }
        }
    }

    fn name(&self) -> &str {
        "folder"
    }
}

/// Serves one fixed frame, or nothing.
#[derive(Debug, Clone, Default)]
pub struct StillFrameSource {
    frame: Option<RgbImage>,
}

impl StillFrameSource {
    pub fn new(frame: RgbImage) -> Self {
        Self { frame: Some(frame) }
    }

    /// A source that is never ready.
    pub fn empty() -> Self {
        Self { frame: None }
    }
}

#[async_trait]
impl FrameSource for StillFrameSource {
    async fn grab_frame(&self) -> Option<RgbImage> {
        self.frame.clone()
    }

    fn name(&self) -> &str {
        "still"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, width: u32, color: [u8; 3]) {
        RgbImage::from_pixel(width, 4, Rgb(color))
            .save(dir.join(name))
            .unwrap();
    }

    #[tokio::test]
    async fn test_folder_round_robin() {
        let dir = TempDir::new().unwrap();
        write_png(dir.path(), "a.png", 4, [255, 0, 0]);
        write_png(dir.path(), "b.png", 6, [0, 255, 0]);
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let source = LocalFolderSource::new(dir.path());
        let widths: Vec<u32> = {
            let mut widths = Vec::new();
            for _ in 0..3 {
                widths.push(source.grab_frame().await.unwrap().width());
            }
            widths
        };
        assert_eq!(widths, vec![4, 6, 4]);
    }

    #[tokio::test]
    async fn test_folder_empty_or_missing() {
        let dir = TempDir::new().unwrap();
        assert!(LocalFolderSource::new(dir.path()).grab_frame().await.is_none());

        let missing = LocalFolderSource::new(dir.path().join("nope"));
        assert!(missing.grab_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_folder_skips_corrupt_frame() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.jpg"), b"not a jpeg").unwrap();
        assert!(LocalFolderSource::new(dir.path()).grab_frame().await.is_none());
    }

    #[test]
    fn test_still_source() {
        let source = StillFrameSource::new(RgbImage::new(3, 2));
        let frame = tokio_test::block_on(source.grab_frame()).unwrap();
        assert_eq!(frame.dimensions(), (3, 2));
        assert!(tokio_test::block_on(StillFrameSource::empty().grab_frame()).is_none());
    }
}
