//! Markdown bundle rendering.
//!
//! Turns a thread into `thread.md` plus an `images/` directory holding
//! every image that could be materialized.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{AppError, Message, Result, Thread};

use super::image_source::ImageSource;

/// File name of the rendered Markdown inside a job directory.
pub const MARKDOWN_FILE: &str = "thread.md";

/// Image subdirectory inside a job directory.
pub const IMAGES_DIR: &str = "images";

/// Outcome of rendering one thread.
#[derive(Debug, Clone)]
pub struct RenderedBundle {
    /// Path of the written Markdown.
    pub markdown_path: PathBuf,
    /// Number of images written under `images/`.
    pub image_count: usize,
    /// Number of image messages rendered as placeholders.
    pub placeholder_count: usize,
}

/// Render `thread` into `out_dir`.
///
/// # Errors
/// Returns error if directories or files cannot be written, or an image
/// cannot be resolved.
pub fn render_bundle(thread: &Thread, out_dir: &Path) -> Result<RenderedBundle> {
    let images_dir = out_dir.join(IMAGES_DIR);
    fs::create_dir_all(&images_dir)
        .map_err(|e| AppError::io("Failed to create images directory", e))?;

    let mut out = String::new();
    let _ = write!(
        out,
        "# {}\n\nCreated: {}\n\n",
        thread.name,
        thread.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    let mut image_count = 0;
    let mut placeholder_count = 0;

    for message in &thread.messages {
        if !message.is_image() {
            push_text(&mut out, message);
            continue;
        }

        let stem = format!("image-{}", message.id);
        match ImageSource::resolve(message).materialize(&images_dir, &stem)? {
            Some(file_name) => {
                push_image(&mut out, message, &file_name);
                image_count += 1;
            }
            None => {
                push_placeholder(&mut out, message);
                placeholder_count += 1;
            }
        }
    }

    let markdown_path = out_dir.join(MARKDOWN_FILE);
    fs::write(&markdown_path, out)
        .map_err(|e| AppError::io("Failed to write markdown", e))?;

    tracing::debug!(
        thread_id = %thread.id,
        messages = thread.message_count(),
        images = image_count,
        placeholders = placeholder_count,
        "Rendered markdown bundle"
    );

    Ok(RenderedBundle {
        markdown_path,
        image_count,
        placeholder_count,
    })
}

fn push_text(out: &mut String, message: &Message) {
    let _ = write!(out, "### {}\n\n{}\n\n", message.role, message.text);
}

fn push_image(out: &mut String, message: &Message, file_name: &str) {
    let _ = write!(
        out,
        "### {} (image)\n\n![{file_name}]({IMAGES_DIR}/{file_name})\n\n",
        message.role
    );
    if !message.text.is_empty() {
        let _ = write!(out, "{}\n\n", message.text);
    }
}

fn push_placeholder(out: &mut String, message: &Message) {
    let _ = write!(
        out,
        "### {} (image placeholder)\n\n*No image data available.*\n\n",
        message.role
    );
    if !message.text.is_empty() {
        let _ = write!(out, "{}\n\n", message.text);
    }
}
