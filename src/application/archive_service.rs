//! Archive service.
//!
//! Front door for callers: thread CRUD against the store, image uploads
//! through the asset store, and export jobs through the queue. Deleting a
//! thread cascades to its job records, its assets and its export outputs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::domain::{
    AppConfig, AppError, DataLayout, ExportFormat, ExportJob, Message, NewMessage, Result,
    Thread, EXTRA_FILE_PATH, EXTRA_IMAGE_BASE64,
};
use crate::infrastructure::{remove_dir_if_exists, AssetStore, ConverterChain, ThreadStore};

use super::export_queue::ExportQueue;

/// Thread archive with background export.
pub struct ArchiveService {
    layout: DataLayout,
    store: Arc<ThreadStore>,
    assets: AssetStore,
    queue: ExportQueue,
}

impl ArchiveService {
    /// Open the archive described by `config` and start its export worker.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns error if the store cannot be opened or a converter name is unknown.
    pub fn open(config: &AppConfig) -> Result<Self> {
        let converters = ConverterChain::from_names(&config.export.pdf_converters)?;
        Self::with_converters(config.layout(), converters, config.poll_interval())
    }

    /// Open an archive at `layout` with an explicit converter chain.
    ///
    /// # Errors
    /// Returns error if the store cannot be opened.
    pub fn with_converters(
        layout: DataLayout,
        converters: ConverterChain,
        poll_interval: Duration,
    ) -> Result<Self> {
        let store = Arc::new(ThreadStore::open(&layout.store_path())?);
        let queue = ExportQueue::start(layout.clone(), Arc::clone(&store), converters, poll_interval);

        tracing::debug!(store = %store.path().display(), "Archive opened");

        Ok(Self {
            assets: AssetStore::new(layout.clone()),
            layout,
            store,
            queue,
        })
    }

    /// On-disk layout of this archive.
    #[must_use]
    pub const fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// All threads, ordered by id.
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    pub fn list_threads(&self) -> Result<Vec<Thread>> {
        self.store.list_threads()
    }

    /// Create an empty thread.
    ///
    /// # Errors
    /// Returns error if the store cannot be written.
    pub fn create_thread(&self, name: Option<&str>) -> Result<Thread> {
        self.store.create_thread(name)
    }

    /// Load one thread.
    ///
    /// # Errors
    /// Returns `NotFound` if the thread does not exist.
    pub fn get_thread(&self, thread_id: &str) -> Result<Thread> {
        self.store
            .get_thread(thread_id)?
            .ok_or_else(|| AppError::thread_not_found(thread_id))
    }

    /// Resolve a full thread id from an id or a unique id prefix.
    ///
    /// # Errors
    /// Returns `NotFound` if nothing matches and `InvalidInput` if the
    /// prefix is ambiguous.
    pub fn resolve_thread_id(&self, id_or_prefix: &str) -> Result<String> {
        if self.store.get_thread(id_or_prefix)?.is_some() {
            return Ok(id_or_prefix.to_string());
        }

        let matches: Vec<String> = self
            .store
            .list_threads()?
            .into_iter()
            .filter(|t| t.id.starts_with(id_or_prefix))
            .map(|t| t.id)
            .collect();

        match matches.as_slice() {
            [] => Err(AppError::thread_not_found(id_or_prefix)),
            [only] => Ok(only.clone()),
            _ => Err(AppError::InvalidInput {
                message: format!(
                    "Thread prefix '{id_or_prefix}' is ambiguous ({} matches)",
                    matches.len()
                ),
            }),
        }
    }

    /// Append a message. An inline image is saved as an asset first and
    /// its path recorded under `file_path`.
    ///
    /// # Errors
    /// Returns `NotFound` if the thread does not exist.
    pub fn add_message(&self, thread_id: &str, mut new: NewMessage) -> Result<Message> {
        if self.store.get_thread(thread_id)?.is_none() {
            return Err(AppError::thread_not_found(thread_id));
        }

        if let Some(extra) = new.extra.as_mut() {
            let saved = extra
                .get(EXTRA_IMAGE_BASE64)
                .and_then(Value::as_str)
                .and_then(|payload| self.assets.save_thread_image(thread_id, payload));

            if let Some(path) = saved {
                extra.insert(
                    EXTRA_FILE_PATH.to_string(),
                    Value::String(path.to_string_lossy().into_owned()),
                );
            }
        }

        self.store.add_message(thread_id, new)
    }

    /// Delete a thread with its jobs, assets and export outputs.
    ///
    /// # Errors
    /// Returns `NotFound` if the thread does not exist, or an IO error if a
    /// directory cannot be removed.
    pub fn delete_thread(&self, thread_id: &str) -> Result<()> {
        if !self.store.delete_thread(thread_id)? {
            return Err(AppError::thread_not_found(thread_id));
        }

        let purged = self.queue.purge_thread(thread_id);
        let assets_removed = self.assets.remove_thread_assets(thread_id)?;
        let exports_removed = remove_dir_if_exists(&self.layout.thread_exports_dir(thread_id))?;

        tracing::info!(
            thread_id = %thread_id,
            jobs = purged,
            assets_removed = assets_removed,
            exports_removed = exports_removed,
            "Thread deleted"
        );
        Ok(())
    }

    /// Queue an export of a thread.
    ///
    /// # Errors
    /// Returns `NotFound` if the thread does not exist.
    pub fn export_thread(&self, thread_id: &str, format: ExportFormat) -> Result<ExportJob> {
        if self.store.get_thread(thread_id)?.is_none() {
            return Err(AppError::thread_not_found(thread_id));
        }
        Ok(self.queue.enqueue(thread_id, format))
    }

    /// Snapshot of an export job, optionally scoped to a thread.
    ///
    /// # Errors
    /// Returns `NotFound` if the job is unknown or belongs to another thread.
    pub fn export_status(&self, thread_id: Option<&str>, job_id: &str) -> Result<ExportJob> {
        self.queue
            .status(job_id)
            .filter(|job| thread_id.is_none_or(|tid| job.thread_id == tid))
            .ok_or_else(|| AppError::job_not_found(job_id))
    }

    /// Artifact of a finished export job, optionally scoped to a thread.
    ///
    /// # Errors
    /// Returns `NotFound` as for [`Self::export_status`], or `Conflict` if
    /// the job has not reached `done`.
    pub fn download(&self, thread_id: Option<&str>, job_id: &str) -> Result<PathBuf> {
        self.export_status(thread_id, job_id)?;
        self.queue.download(job_id)
    }

    /// Stop the export worker after its current job.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }
}
