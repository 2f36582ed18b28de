//! Domain-level error types for thread-archive.
//!
//! All errors are typed with `thiserror`. Export worker failures are
//! flattened to their `Display` text and stored on the job record.

use thiserror::Error;

use super::export::ExportStatus;

/// Application-level errors.
#[derive(Error, Debug)]
pub enum AppError {
    /// Referenced thread or export job does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Export artifact requested before the job reached `done`.
    #[error("Export not ready: {status}")]
    Conflict { status: ExportStatus },

    /// Caller supplied an unusable value.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Base64 or data URI payload could not be decoded.
    #[error("Decode error: {message}")]
    Decode {
        message: String,
        #[source]
        source: Option<base64::DecodeError>,
    },

    /// Every converter in the PDF chain was missing or failed.
    #[error("No PDF converter available (tried: {tried})")]
    NoConverter { tried: String },

    /// A single external converter failed.
    #[error("Converter '{name}' failed: {message}")]
    Converter { name: String, message: String },

    /// Zip packaging failed.
    #[error("Archive error: {message}")]
    Archive {
        message: String,
        #[source]
        source: Option<zip::result::ZipError>,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl AppError {
    /// Thread lookup miss.
    pub fn thread_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Thread",
            id: id.into(),
        }
    }

    /// Export job lookup miss.
    pub fn job_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Export job",
            id: id.into(),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse(err: serde_json::Error) -> Self {
        Self::JsonParse {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Create a base64 decode error with context.
    pub fn decode(message: impl Into<String>, err: base64::DecodeError) -> Self {
        Self::Decode {
            message: format!("{}: {err}", message.into()),
            source: Some(err),
        }
    }

    /// Create a zip packaging error.
    pub fn archive(err: zip::result::ZipError) -> Self {
        Self::Archive {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Whether this is a lookup miss.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether this is a thread lookup miss.
    #[must_use]
    pub fn is_thread_not_found(&self) -> bool {
        matches!(self, Self::NotFound { kind, .. } if *kind == "Thread")
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;
