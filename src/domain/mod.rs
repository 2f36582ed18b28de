//! Domain layer - core types and error taxonomy.
//!
//! This layer contains pure domain models and error types
//! without any IO.

pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod payload;

pub use config::{AppConfig, DataLayout, PathConfig};
pub use error::{AppError, Result};
pub use export::{ExportFormat, ExportJob, ExportStatus};
pub use models::{
    Message, MessageKind, NewMessage, Thread, EXTRA_FILE_PATH, EXTRA_IMAGE_BASE64,
};
pub use payload::{encode_data_uri, ImagePayload, DEFAULT_IMAGE_EXT};
