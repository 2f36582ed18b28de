//! Configuration and on-disk layout.
//!
//! Contains the TOML-backed application configuration and the path
//! scheme shared by the store, the asset helper and the export worker.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Configuration for the export pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Worker idle time between polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// PDF converters, tried in order.
    #[serde(default = "default_pdf_converters")]
    pub pdf_converters: Vec<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            pdf_converters: default_pdf_converters(),
        }
    }
}

const fn default_poll_interval_ms() -> u64 {
    500
}

fn default_pdf_converters() -> Vec<String> {
    vec!["pandoc".to_string(), "weasyprint".to_string()]
}

/// Path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathConfig {
    /// Base data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Path configuration.
    #[serde(default)]
    pub paths: PathConfig,

    /// Export pipeline configuration.
    #[serde(default)]
    pub export: ExportConfig,
}

impl AppConfig {
    /// Get the data directory, using default if not configured.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.paths
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".thread-archive")
    }

    /// Get the config file path.
    #[must_use]
    pub fn config_file_path(&self) -> PathBuf {
        self.data_dir().join("config.toml")
    }

    /// On-disk layout rooted at the data directory.
    #[must_use]
    pub fn layout(&self) -> DataLayout {
        DataLayout::new(self.data_dir())
    }

    /// Worker poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.export.poll_interval_ms)
    }
}

/// Where threads, assets and export artifacts live.
///
/// ```text
/// <root>/chat_threads.json
/// <root>/thread_assets/<thread_id>/
/// <root>/exports/<thread_id>/<job_id>/{thread.md, images/}
/// <root>/exports/<thread_id>/<job_id>.{zip,pdf}
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    /// Layout rooted at `root`, resolved against the current directory.
    ///
    /// Converters run with a job directory as their working directory, so
    /// every path handed out here must be absolute.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    /// Root data directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The thread store document.
    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.root.join("chat_threads.json")
    }

    /// Parent of all per-thread asset directories.
    #[must_use]
    pub fn assets_dir(&self) -> PathBuf {
        self.root.join("thread_assets")
    }

    /// Uploaded images for one thread.
    #[must_use]
    pub fn thread_assets_dir(&self, thread_id: &str) -> PathBuf {
        self.assets_dir().join(thread_id)
    }

    /// Parent of all per-thread export directories.
    #[must_use]
    pub fn exports_dir(&self) -> PathBuf {
        self.root.join("exports")
    }

    /// Export outputs for one thread.
    #[must_use]
    pub fn thread_exports_dir(&self, thread_id: &str) -> PathBuf {
        self.exports_dir().join(thread_id)
    }

    /// Working directory of one export job.
    #[must_use]
    pub fn job_dir(&self, thread_id: &str, job_id: &str) -> PathBuf {
        self.thread_exports_dir(thread_id).join(job_id)
    }

    /// Packaged artifact of one export job (`ext` is `zip` or `pdf`).
    #[must_use]
    pub fn job_artifact(&self, thread_id: &str, job_id: &str, ext: &str) -> PathBuf {
        self.thread_exports_dir(thread_id)
            .join(format!("{job_id}.{ext}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.export.poll_interval_ms, 500);
        assert_eq!(config.export.pdf_converters, vec!["pandoc", "weasyprint"]);
        assert!(config.data_dir().ends_with(".thread-archive"));
    }

    #[test]
    fn test_layout_paths() {
        let layout = DataLayout::new("/data");
        assert_eq!(layout.store_path(), PathBuf::from("/data/chat_threads.json"));
        assert_eq!(
            layout.thread_assets_dir("t1"),
            PathBuf::from("/data/thread_assets/t1")
        );
        assert_eq!(layout.job_dir("t1", "j1"), PathBuf::from("/data/exports/t1/j1"));
        assert_eq!(
            layout.job_artifact("t1", "j1", "zip"),
            PathBuf::from("/data/exports/t1/j1.zip")
        );
    }

    #[test]
    fn test_custom_data_dir() {
        let config = AppConfig {
            paths: PathConfig {
                data_dir: Some(PathBuf::from("/srv/archive")),
            },
            ..Default::default()
        };
        assert_eq!(config.layout().root(), Path::new("/srv/archive"));
    }

    #[test]
    fn test_relative_root_is_absolutized() {
        let layout = DataLayout::new("relative/archive");
        assert!(layout.root().is_absolute());
        assert!(layout.root().ends_with("relative/archive"));
        assert!(layout.job_artifact("t1", "j1", "pdf").is_absolute());
    }
}
