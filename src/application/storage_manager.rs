//! Storage accounting.
//!
//! Reports how much disk the archive uses, split by store document,
//! uploaded assets and export outputs.

use std::fs;
use std::path::Path;

use crate::domain::{AppError, DataLayout, Result, Thread};

/// Reads sizes and counts under a data directory.
pub struct StorageManager {
    layout: DataLayout,
}

impl StorageManager {
    /// Create a new storage manager.
    #[must_use]
    pub const fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    /// Get total storage usage in bytes.
    ///
    /// # Errors
    /// Returns error if a directory cannot be read.
    pub fn get_total_size(&self) -> Result<u64> {
        calculate_dir_size(self.layout.root())
    }

    /// Count finished export artifacts (`.zip` and `.pdf`) across threads.
    ///
    /// # Errors
    /// Returns error if the exports directory cannot be read.
    pub fn count_artifacts(&self) -> Result<usize> {
        let exports_dir = self.layout.exports_dir();
        if !exports_dir.exists() {
            return Ok(0);
        }

        let mut count = 0;
        let threads = fs::read_dir(&exports_dir)
            .map_err(|e| AppError::io("Failed to read exports directory", e))?;

        for thread_dir in threads.filter_map(std::result::Result::ok) {
            let path = thread_dir.path();
            if !path.is_dir() {
                continue;
            }
            let entries = fs::read_dir(&path)
                .map_err(|e| AppError::io(format!("Failed to read directory {}", path.display()), e))?;
            count += entries
                .filter_map(std::result::Result::ok)
                .filter(|e| {
                    e.path()
                        .extension()
                        .is_some_and(|ext| ext == "zip" || ext == "pdf")
                })
                .count();
        }

        Ok(count)
    }

    /// Get storage summary for the given threads.
    ///
    /// # Errors
    /// Returns error if a directory cannot be read.
    pub fn get_summary(&self, threads: &[Thread]) -> Result<StorageSummary> {
        let store_size = fs::metadata(self.layout.store_path())
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StorageSummary {
            thread_count: threads.len(),
            message_count: threads.iter().map(Thread::message_count).sum(),
            image_count: threads.iter().map(Thread::image_count).sum(),
            artifact_count: self.count_artifacts()?,
            total_bytes: self.get_total_size()?,
            store_size,
            assets_size: calculate_dir_size(&self.layout.assets_dir())?,
            exports_size: calculate_dir_size(&self.layout.exports_dir())?,
        })
    }
}

/// Storage summary information.
#[derive(Debug, Clone, Default)]
pub struct StorageSummary {
    /// Number of threads.
    pub thread_count: usize,
    /// Messages across all threads.
    pub message_count: usize,
    /// Image messages across all threads.
    pub image_count: usize,
    /// Export artifacts on disk.
    pub artifact_count: usize,
    /// Total storage used in bytes.
    pub total_bytes: u64,
    /// Store document size in bytes.
    pub store_size: u64,
    /// Assets directory size in bytes.
    pub assets_size: u64,
    /// Exports directory size in bytes.
    pub exports_size: u64,
}

impl StorageSummary {
    /// Format total size as human readable.
    #[must_use]
    pub fn total_human(&self) -> String {
        format_bytes(self.total_bytes)
    }

    /// Format store size as human readable.
    #[must_use]
    pub fn store_human(&self) -> String {
        format_bytes(self.store_size)
    }

    /// Format assets size as human readable.
    #[must_use]
    pub fn assets_human(&self) -> String {
        format_bytes(self.assets_size)
    }

    /// Format exports size as human readable.
    #[must_use]
    pub fn exports_human(&self) -> String {
        format_bytes(self.exports_size)
    }
}

/// Calculate total size of a directory recursively.
fn calculate_dir_size(path: &Path) -> Result<u64> {
    if !path.exists() {
        return Ok(0);
    }

    let mut total = 0u64;

    let entries = fs::read_dir(path)
        .map_err(|e| AppError::io(format!("Failed to read directory {}", path.display()), e))?;

    for entry in entries.filter_map(std::result::Result::ok) {
        let path = entry.path();
        let metadata = fs::metadata(&path)
            .map_err(|e| AppError::io(format!("Failed to read metadata {}", path.display()), e))?;

        if metadata.is_file() {
            total += metadata.len();
        } else if metadata.is_dir() {
            total += calculate_dir_size(&path)?;
        }
    }

    Ok(total)
}

/// Format bytes as human readable string.
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
