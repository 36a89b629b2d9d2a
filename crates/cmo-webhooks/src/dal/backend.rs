/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! Key-value persistence backends.
//!
//! The stores keep their working set in memory and write every mutation
//! through to a backend as a single JSON document per key.

use crate::error::{Result, WebhookError};
use cmo_utils::config::Storage;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Minimal storage contract needed by the stores.
pub trait KeyValueBackend: Send + Sync {
    /// Returns the document stored under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<String>>;

    /// Replaces the document stored under `key`.
    fn save(&self, key: &str, value: &str) -> Result<()>;
}

/// Opens the backend selected by the storage settings.
///
/// An empty `path` keeps state in memory; otherwise state lives in that
/// directory.
pub fn open_backend(storage: &Storage) -> Result<Arc<dyn KeyValueBackend>> {
    if storage.is_persistent() {
        info!("Persisting webhook state to {}", storage.path);
        Ok(Arc::new(FileBackend::new(&storage.path)?))
    } else {
        info!("Keeping webhook state in memory");
        Ok(Arc::new(MemoryBackend::new()))
    }
}

/// Process-local backend. State is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| WebhookError::Storage("memory backend lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| WebhookError::Storage("memory backend lock poisoned".to_string()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Stores each key as `<dir>/<key>.json`.
///
/// Writes go to a temporary sibling file which is then renamed over the
/// target, so a crash never leaves a half-written document behind.
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Opens (and creates if needed) the directory at `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueBackend for FileBackend {
    fn load(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<()> {
        let target = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.json.tmp", key));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &target)?;
        debug!("Persisted {} bytes to {}", value.len(), target.display());
        Ok(())
    }
}
