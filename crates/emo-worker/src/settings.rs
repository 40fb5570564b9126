//! Persisted capture settings.
//!
//! The enabled flag and the free-text context survive restarts in a small
//! JSON file. The capture loop only reads them, through a watch channel
//! sampled at the start of each cycle.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{CaptureError, CaptureResult};

/// User-controlled capture settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Whether new cycles are scheduled
    pub enabled: bool,
    /// Free-text context sent with every upload
    pub context: String,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            context: String::new(),
        }
    }
}

/// Owns the settings file and broadcasts changes.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    tx: watch::Sender<CaptureSettings>,
}

impl SettingsStore {
    /// Load settings from `path`, falling back to defaults if it does not exist.
    pub async fn load(path: impl Into<PathBuf>) -> CaptureResult<Self> {
        let path = path.into();
        let settings = match read_settings(&path).await? {
            Some(settings) => settings,
            None => {
                info!(path = %path.display(), "No settings file, using defaults");
                CaptureSettings::default()
            }
        };
        let (tx, _) = watch::channel(settings);
        Ok(Self { path, tx })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn subscribe(&self) -> watch::Receiver<CaptureSettings> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> CaptureSettings {
        self.tx.borrow().clone()
    }

    pub async fn set_enabled(&self, enabled: bool) -> CaptureResult<()> {
        self.update(|s| s.enabled = enabled).await
    }

    pub async fn set_context(&self, context: impl Into<String>) -> CaptureResult<()> {
        let context = context.into();
        self.update(|s| s.context = context).await
    }

    /// Apply `change`, persist, then publish if anything changed.
    pub async fn update(&self, change: impl FnOnce(&mut CaptureSettings)) -> CaptureResult<()> {
        let mut next = self.current();
        change(&mut next);
        if next == self.current() {
            return Ok(());
        }
        write_settings(&self.path, &next).await?;
        self.publish(next);
        Ok(())
    }

    /// Re-read the file and publish edits made outside the process.
    ///
    /// Returns whether the settings changed. A missing file keeps the
    /// current settings.
    pub async fn reload(&self) -> CaptureResult<bool> {
        match read_settings(&self.path).await? {
            Some(settings) if settings != self.current() => {
                self.publish(settings);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn publish(&self, settings: CaptureSettings) {
        info!(
            enabled = settings.enabled,
            context_len = settings.context.len(),
            "Capture settings changed"
        );
        self.tx.send_replace(settings);
    }
}

async fn read_settings(path: &Path) -> CaptureResult<Option<CaptureSettings>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| CaptureError::settings(format!("{}: {}", path.display(), e)))
}

/// Write through a sibling temp file so readers never see a partial file.
async fn write_settings(path: &Path, settings: &CaptureSettings) -> CaptureResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(settings)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        warn!(path = %path.display(), error = %e, "Failed to replace settings file");
        return Err(e.into());
    }
    debug!(path = %path.display(), "Settings saved");
    Ok(())
}
