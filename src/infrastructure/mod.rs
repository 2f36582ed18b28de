//! Infrastructure layer - external adapters (filesystem, converters).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod archive;
pub mod asset_store;
pub mod config;
pub mod converters;
pub mod thread_store;

pub use archive::zip_directory;
pub use asset_store::{remove_dir_if_exists, AssetStore};
pub use config::{ensure_config_exists, load_config, save_config};
pub use converters::{ConverterChain, PdfConverter, PdfRequest};
pub use thread_store::ThreadStore;
