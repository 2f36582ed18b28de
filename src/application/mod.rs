//! Application layer - use cases and orchestration.
//!
//! This layer contains the archive service, the export pipeline
//! and terminal formatting.

pub mod archive_service;
pub mod export_queue;
pub mod formatter;
pub mod image_source;
pub mod renderer;
pub mod storage_manager;

pub use archive_service::ArchiveService;
pub use formatter::{
    format_converters, format_job, format_job_json, format_stats, format_thread_markdown,
    format_threads_json, format_threads_table, OutputFormat,
};
pub use storage_manager::StorageManager;
