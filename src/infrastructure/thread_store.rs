//! File-backed thread storage.
//!
//! The whole store is one JSON document mapping thread id to thread record.
//! Every operation holds a single process-wide lock across its
//! read-modify-write cycle and rewrites the full document on mutation.
//! There is no journal: a crash mid-write can leave a truncated file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{AppError, Message, NewMessage, Result, Thread};

/// On-disk document shape.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    threads: BTreeMap<String, Thread>,
}

/// Thread repository backed by a single JSON file.
pub struct ThreadStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ThreadStore {
    /// Opens or creates the store file.
    ///
    /// # Errors
    /// Returns error if the parent directory or the initial document cannot be written.
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::io("Failed to create store directory", e))?;
        }

        let store = Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        };

        if !path.exists() {
            let _guard = store.lock.lock();
            store.save(&StoreDocument::default())?;
            tracing::info!(path = %path.display(), "Created thread store");
        }

        Ok(store)
    }

    /// Path of the backing document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the document. Caller must hold `self.lock`.
    fn load(&self) -> Result<StoreDocument> {
        let content = fs::read_to_string(&self.path).map_err(|e| {
            AppError::io(
                format!("Failed to read thread store: {}", self.path.display()),
                e,
            )
        })?;

        if content.trim().is_empty() {
            return Ok(StoreDocument::default());
        }

        serde_json::from_str(&content).map_err(AppError::json_parse)
    }

    /// Rewrite the whole document. Caller must hold `self.lock`.
    fn save(&self, doc: &StoreDocument) -> Result<()> {
        let content = serde_json::to_string_pretty(doc).map_err(AppError::json_parse)?;
        fs::write(&self.path, content).map_err(|e| {
            AppError::io(
                format!("Failed to write thread store: {}", self.path.display()),
                e,
            )
        })
    }

    /// List all threads, ordered by id.
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    pub fn list_threads(&self) -> Result<Vec<Thread>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.threads.into_values().collect())
    }

    /// Create a thread. A missing name defaults to `Thread <creation time>`.
    ///
    /// # Errors
    /// Returns error if the store cannot be read or written.
    pub fn create_thread(&self, name: Option<&str>) -> Result<Thread> {
        let now = Utc::now();
        let name = match name {
            Some(n) if !n.trim().is_empty() => n.to_string(),
            _ => format!("Thread {}", now.to_rfc3339_opts(SecondsFormat::Secs, true)),
        };

        let thread = Thread {
            id: Uuid::new_v4().to_string(),
            name,
            created_at: now,
            modified_at: now,
            messages: Vec::new(),
        };

        let _guard = self.lock.lock();
        let mut doc = self.load()?;
        doc.threads.insert(thread.id.clone(), thread.clone());
        self.save(&doc)?;

        tracing::debug!(thread_id = %thread.id, "Created thread");
        Ok(thread)
    }

    /// Get a thread by id.
    ///
    /// # Errors
    /// Returns error if the store cannot be read.
    pub fn get_thread(&self, thread_id: &str) -> Result<Option<Thread>> {
        let _guard = self.lock.lock();
        Ok(self.load()?.threads.remove(thread_id))
    }

    /// Remove a thread record. Assets and exports are left to the caller.
    ///
    /// # Errors
    /// Returns error if the store cannot be read or written.
    pub fn delete_thread(&self, thread_id: &str) -> Result<bool> {
        let _guard = self.lock.lock();
        let mut doc = self.load()?;
        if doc.threads.remove(thread_id).is_none() {
            return Ok(false);
        }
        self.save(&doc)?;

        tracing::debug!(thread_id = %thread_id, "Deleted thread record");
        Ok(true)
    }

    /// Append a message and bump the thread's modified time.
    ///
    /// # Errors
    /// Returns `NotFound` if the thread does not exist, or an IO/JSON error.
    pub fn add_message(&self, thread_id: &str, new: NewMessage) -> Result<Message> {
        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4().to_string(),
            role: new.role,
            kind: new.kind,
            text: new.text.unwrap_or_default(),
            extra: new.extra.unwrap_or_default(),
            created_at: now,
        };

        let _guard = self.lock.lock();
        let mut doc = self.load()?;
        let thread = doc
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| AppError::thread_not_found(thread_id))?;
        thread.messages.push(message.clone());
        thread.modified_at = now;
        self.save(&doc)?;

        Ok(message)
    }
}
