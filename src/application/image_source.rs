//! Image resolution for exported bundles.
//!
//! An image message resolves to exactly one source, in priority order:
//! an on-disk asset, an inline data URI, inline bare base64, or nothing.
//! Each source has its own materialization function.

use std::fs;
use std::path::Path;

use crate::domain::{
    AppError, ImagePayload, Message, Result, DEFAULT_IMAGE_EXT, EXTRA_FILE_PATH,
    EXTRA_IMAGE_BASE64,
};

/// Where an image message's bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource<'a> {
    /// Persisted asset that exists on disk.
    File(&'a Path),
    /// `data:<mime>;base64,<payload>`.
    DataUri(ImagePayload<'a>),
    /// Base64 with no type information.
    Base64(ImagePayload<'a>),
    /// No usable image data.
    Missing,
}

impl<'a> ImageSource<'a> {
    /// Resolve the source for `message` from its extension map.
    #[must_use]
    pub fn resolve(message: &'a Message) -> Self {
        if let Some(path) = message.extra_str(EXTRA_FILE_PATH).map(Path::new) {
            if path.is_file() {
                return Self::File(path);
            }
            tracing::debug!(
                message_id = %message.id,
                path = %path.display(),
                "Image asset missing on disk, trying inline data"
            );
        }

        match message
            .extra_str(EXTRA_IMAGE_BASE64)
            .filter(|s| !s.trim().is_empty())
            .map(ImagePayload::parse)
        {
            Some(payload @ ImagePayload::DataUri { .. }) => Self::DataUri(payload),
            Some(payload @ ImagePayload::Bare(_)) => Self::Base64(payload),
            None => Self::Missing,
        }
    }

    /// Write the image into `images_dir` as `<stem>.<ext>`.
    ///
    /// Returns the saved file name, or `None` for [`ImageSource::Missing`].
    ///
    /// # Errors
    /// Returns error if the file cannot be copied, or the payload cannot be
    /// decoded even by the fallback attempt.
    pub fn materialize(&self, images_dir: &Path, stem: &str) -> Result<Option<String>> {
        match self {
            Self::File(path) => copy_file(path, images_dir, stem).map(Some),
            Self::DataUri(payload) => write_data_uri(payload, images_dir, stem).map(Some),
            Self::Base64(payload) => write_bare(payload, images_dir, stem).map(Some),
            Self::Missing => Ok(None),
        }
    }
}

fn copy_file(path: &Path, images_dir: &Path, stem: &str) -> Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .unwrap_or(DEFAULT_IMAGE_EXT);
    let name = format!("{stem}.{ext}");

    fs::copy(path, images_dir.join(&name))
        .map_err(|e| AppError::io(format!("Failed to copy image {}", path.display()), e))?;

    Ok(name)
}

/// Decode with the declared type; on decode failure retry the whole value
/// leniently under the default extension.
fn write_data_uri(payload: &ImagePayload<'_>, images_dir: &Path, stem: &str) -> Result<String> {
    match payload.decode() {
        Ok(bytes) => write_image(images_dir, stem, payload.export_extension(), &bytes),
        Err(e) => {
            tracing::warn!(error = %e, stem = stem, "Data URI decode failed, retrying as raw base64");
            let bytes = payload.decode_lenient()?;
            write_image(images_dir, stem, DEFAULT_IMAGE_EXT, &bytes)
        }
    }
}

fn write_bare(payload: &ImagePayload<'_>, images_dir: &Path, stem: &str) -> Result<String> {
    let bytes = match payload.decode() {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, stem = stem, "Base64 decode failed, retrying leniently");
            payload.decode_lenient()?
        }
    };
    write_image(images_dir, stem, DEFAULT_IMAGE_EXT, &bytes)
}

fn write_image(images_dir: &Path, stem: &str, ext: &str, bytes: &[u8]) -> Result<String> {
    let name = format!("{stem}.{ext}");
    fs::write(images_dir.join(&name), bytes)
        .map_err(|e| AppError::io(format!("Failed to write image {name}"), e))?;
    Ok(name)
}
