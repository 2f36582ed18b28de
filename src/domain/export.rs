//! Export job records and their lifecycle.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of an export job: `pending -> working -> {done | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    /// Waiting for the worker.
    Pending,
    /// Claimed by the worker and rendering.
    Working,
    /// Artifact ready for download.
    Done,
    /// Rendering failed; see the job's error.
    Failed,
}

impl ExportStatus {
    /// Whether the job will not change state again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Working => write!(f, "working"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Requested deliverable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Markdown bundle (delivered as the zip).
    Md,
    /// Zip of Markdown plus images.
    #[default]
    Zip,
    /// Zip plus a PDF conversion; the PDF is the deliverable.
    Pdf,
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md => write!(f, "md"),
            Self::Zip => write!(f, "zip"),
            Self::Pdf => write!(f, "pdf"),
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "md" | "markdown" => Ok(Self::Md),
            "zip" => Ok(Self::Zip),
            "pdf" => Ok(Self::Pdf),
            _ => Err(format!("Unknown export format: {s}. Use: md, zip, pdf")),
        }
    }
}

/// An asynchronous request to render a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportJob {
    /// Unique job identifier.
    pub id: String,
    /// Thread being exported.
    pub thread_id: String,
    /// Requested deliverable.
    pub format: ExportFormat,
    /// Current lifecycle state.
    pub status: ExportStatus,
    /// Artifact path once `done`.
    pub result_path: Option<PathBuf>,
    /// Failure message once `failed`.
    pub error: Option<String>,
    /// When the job was enqueued.
    pub created_at: DateTime<Utc>,
}

impl ExportJob {
    /// Create a pending job.
    #[must_use]
    pub fn new(thread_id: impl Into<String>, format: ExportFormat) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.into(),
            format,
            status: ExportStatus::Pending,
            result_path: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Mark as claimed by the worker.
    pub fn start(&mut self) {
        self.status = ExportStatus::Working;
    }

    /// Mark as done with the deliverable path.
    pub fn complete(&mut self, result_path: PathBuf) {
        self.status = ExportStatus::Done;
        self.result_path = Some(result_path);
        self.error = None;
    }

    /// Mark as failed with a message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = ExportStatus::Failed;
        self.error = Some(error.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_transitions() {
        let mut job = ExportJob::new("t1", ExportFormat::Zip);
        assert_eq!(job.status, ExportStatus::Pending);

        job.start();
        assert_eq!(job.status, ExportStatus::Working);
        assert!(!job.status.is_terminal());

        job.complete(PathBuf::from("/tmp/x.zip"));
        assert_eq!(job.status, ExportStatus::Done);
        assert!(job.status.is_terminal());
        assert!(job.result_path.is_some());
    }

    #[test]
    fn test_job_failure_keeps_message() {
        let mut job = ExportJob::new("t1", ExportFormat::Pdf);
        job.start();
        job.fail("boom");
        assert_eq!(job.status, ExportStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_export_format_from_str() {
        assert_eq!("md".parse::<ExportFormat>(), Ok(ExportFormat::Md));
        assert_eq!("ZIP".parse::<ExportFormat>(), Ok(ExportFormat::Zip));
        assert_eq!("pdf".parse::<ExportFormat>(), Ok(ExportFormat::Pdf));
        assert!("docx".parse::<ExportFormat>().is_err());
        assert_eq!(ExportFormat::default(), ExportFormat::Zip);
    }
}
