// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Key/value storage seam (the engine's equivalent of browser local storage).
//!
//! Two implementations ship with the crate:
//! - [`MemoryStore`]: process-local, used for per-tab session scope and tests
//! - [`FileStore`]: a JSON object on disk, shared by every engine pointed at the
//!   same path
//!
//! Neither implementation orders writes across processes.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::debug;

use crate::error::ParleyError;

/// String key/value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, ParleyError>;
    fn set(&self, key: &str, value: &str) -> Result<(), ParleyError>;
    fn remove(&self, key: &str) -> Result<(), ParleyError>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, ParleyError> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ParleyError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ParleyError> {
        self.lock().remove(key);
        Ok(())
    }
}

/// A store persisted as a single JSON object file.
///
/// Every operation re-reads the file so that separate engines sharing the path
/// observe each other's writes. Writes go through a temporary file and a rename.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, ParleyError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(ParleyError::Storage { source: Box::new(e) }),
        };
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| ParleyError::Cache {
            message: format!("store file {} is corrupt: {e}", self.path.display()),
            source: Some(Box::new(e)),
        })
    }

    fn write_all(&self, entries: &BTreeMap<String, String>) -> Result<(), ParleyError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .map_err(|e| ParleyError::Storage { source: Box::new(e) })?;
        }
        let body = serde_json::to_string_pretty(entries)
            .map_err(|e| ParleyError::Internal(format!("failed to encode store: {e}")))?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, body).map_err(|e| ParleyError::Storage { source: Box::new(e) })?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| ParleyError::Storage { source: Box::new(e) })?;
        debug!(path = %self.path.display(), keys = entries.len(), "store written");
        Ok(())
    }

    fn modify(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), ParleyError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        // A corrupt file is replaced rather than blocking every future write.
        let mut entries = self.read_all().unwrap_or_default();
        f(&mut entries);
        self.write_all(&entries)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, ParleyError> {
        Ok(self.read_all()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ParleyError> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), ParleyError> {
        self.modify(|entries| {
            entries.remove(key);
        })
    }
}
