//! Zip packaging of rendered export directories.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::domain::{AppError, Result};

/// Zip every regular file under `src_dir` into `zip_path`.
///
/// Entry names are relative to `src_dir` with `/` separators, so a bundle
/// holds `thread.md` at the root and images under `images/`.
///
/// # Errors
/// Returns error if the directory cannot be walked or the archive cannot be written.
pub fn zip_directory(src_dir: &Path, zip_path: &Path) -> Result<usize> {
    let mut files = Vec::new();
    collect_files(src_dir, &mut files)?;
    files.sort();

    if let Some(parent) = zip_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| AppError::io("Failed to create archive directory", e))?;
    }

    let file = File::create(zip_path)
        .map_err(|e| AppError::io(format!("Failed to create {}", zip_path.display()), e))?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in &files {
        let name = entry_name(src_dir, path)?;
        let bytes = fs::read(path)
            .map_err(|e| AppError::io(format!("Failed to read {}", path.display()), e))?;

        zip.start_file(name, options).map_err(AppError::archive)?;
        zip.write_all(&bytes)
            .map_err(|e| AppError::io("Failed to write archive entry", e))?;
    }

    zip.finish().map_err(AppError::archive)?;

    tracing::debug!(
        path = %zip_path.display(),
        entries = files.len(),
        "Wrote archive"
    );

    Ok(files.len())
}

/// Archive entry name for `path` relative to `root`.
fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).map_err(|_| AppError::InvalidInput {
        message: format!("{} is outside {}", path.display(), root.display()),
    })?;

    Ok(rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Recursively collect regular files.
fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let entries = fs::read_dir(dir)
        .map_err(|e| AppError::io(format!("Failed to read {}", dir.display()), e))?;

    for entry in entries.filter_map(std::result::Result::ok) {
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if path.is_file() {
            files.push(path);
        }
    }

    Ok(())
}
