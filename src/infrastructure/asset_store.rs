//! Per-thread image assets.
//!
//! Uploaded inline images are decoded once and written under
//! `<data>/thread_assets/<thread_id>/` so messages can reference them by path.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::domain::{AppError, DataLayout, ImagePayload, Result};

/// Writes and removes uploaded image files.
#[derive(Debug, Clone)]
pub struct AssetStore {
    layout: DataLayout,
}

impl AssetStore {
    /// Create an asset store over the given layout.
    #[must_use]
    pub const fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    /// Decode `payload` into the thread's asset directory.
    ///
    /// Returns `None` if the payload cannot be decoded or written.
    #[must_use]
    pub fn save_thread_image(&self, thread_id: &str, payload: &str) -> Option<PathBuf> {
        save_base64_image(payload, &self.layout.thread_assets_dir(thread_id), "image")
    }

    /// Delete the thread's asset directory if present.
    ///
    /// # Errors
    /// Returns error if the directory exists but cannot be removed.
    pub fn remove_thread_assets(&self, thread_id: &str) -> Result<bool> {
        remove_dir_if_exists(&self.layout.thread_assets_dir(thread_id))
    }
}

/// Decode a data URI or bare base64 image and save it as
/// `<dest_dir>/<prefix>-<uuid>.<ext>`.
///
/// Returns the absolute path, or `None` on any failure.
#[must_use]
pub fn save_base64_image(payload: &str, dest_dir: &Path, prefix: &str) -> Option<PathBuf> {
    match try_save_base64_image(payload, dest_dir, prefix) {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::warn!(dir = %dest_dir.display(), error = %e, "Failed to save image asset");
            None
        }
    }
}

fn try_save_base64_image(payload: &str, dest_dir: &Path, prefix: &str) -> Result<PathBuf> {
    fs::create_dir_all(dest_dir)
        .map_err(|e| AppError::io("Failed to create asset directory", e))?;

    let payload = ImagePayload::parse(payload);
    let bytes = payload.decode()?;

    let filename = format!(
        "{prefix}-{}.{}",
        Uuid::new_v4().simple(),
        payload.asset_extension()
    );
    let path = dest_dir.join(filename);
    fs::write(&path, bytes).map_err(|e| AppError::io("Failed to write image asset", e))?;

    let path = fs::canonicalize(&path)
        .map_err(|e| AppError::io("Failed to resolve image asset path", e))?;
    tracing::debug!(path = %path.display(), "Saved image asset");
    Ok(path)
}

/// Remove a directory tree, treating absence as success.
///
/// # Errors
/// Returns error if removal fails for a reason other than absence.
pub fn remove_dir_if_exists(dir: &Path) -> Result<bool> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            tracing::info!(path = %dir.display(), "Removed directory");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(AppError::io(
            format!("Failed to remove {}", dir.display()),
            e,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_data_uri_jpeg() {
        let dir = tempdir().unwrap();
        let path = save_base64_image("data:image/jpeg;base64,/9j/AA==", dir.path(), "image").unwrap();

        assert!(path.is_absolute());
        assert_eq!(path.extension().unwrap(), "jpg");
        assert_eq!(fs::read(&path).unwrap(), vec![0xff, 0xd8, 0xff, 0x00]);
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("image-"));
    }

    #[test]
    fn test_save_bare_base64_defaults_to_png() {
        let dir = tempdir().unwrap();
        let path = save_base64_image("AAAA", dir.path(), "upload").unwrap();
        assert_eq!(path.extension().unwrap(), "png");
    }

    #[test]
    fn test_save_gif_keeps_extension() {
        let dir = tempdir().unwrap();
        let path = save_base64_image("data:image/gif;base64,R0lG", dir.path(), "image").unwrap();
        assert_eq!(path.extension().unwrap(), "gif");
    }

    #[test]
    fn test_save_invalid_returns_none() {
        let dir = tempdir().unwrap();
        assert!(save_base64_image("data:image/png;base64,%%%", dir.path(), "image").is_none());
        assert!(save_base64_image("", dir.path(), "image").is_none());
    }

    #[test]
    fn test_thread_assets_lifecycle() {
        let dir = tempdir().unwrap();
        let assets = AssetStore::new(DataLayout::new(dir.path()));

        let path = assets.save_thread_image("t1", "AAAA").unwrap();
        assert!(path.starts_with(fs::canonicalize(dir.path()).unwrap()));
        assert!(path.exists());

        assert!(assets.remove_thread_assets("t1").unwrap());
        assert!(!path.exists());
        assert!(!assets.remove_thread_assets("t1").unwrap());
    }
}
