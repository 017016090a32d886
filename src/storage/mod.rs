//! Persistent key/value state for the client.
//!
//! Holds the login token and the last chat-room credentials between runs.
//! Values can be sealed at rest with [`Sealer`].

mod sealer;

pub use sealer::Sealer;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::task;
use tracing::{debug, warn};

use crate::error::StorageError;

pub const TOKEN: &str = "token";
pub const ROOM_ID: &str = "roomId";
pub const CLIENT_ID: &str = "clientId";
pub const CLIENT_TOKEN: &str = "clientToken";

#[derive(Debug)]
pub struct LocalStore {
    path: Option<PathBuf>,
    sealer: Option<Sealer>,
    entries: RwLock<BTreeMap<String, String>>,
}

impl LocalStore {
    /// Store that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            sealer: None,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    /// Opens (or lazily creates) a JSON-backed store at `path`.
    pub fn open(path: impl AsRef<Path>, sealer: Option<Sealer>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| StorageError::Corrupt(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StorageError::Io(e.to_string())),
        };
        debug!(path = %path.display(), keys = entries.len(), "opened local store");

        Ok(Self {
            path: Some(path),
            sealer,
            entries: RwLock::new(entries),
        })
    }

    /// Returns the value for `key`; unreadable sealed values read as absent.
    pub fn get(&self, key: &str) -> Option<String> {
        let raw = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()?;

        match &self.sealer {
            Some(sealer) => match sealer.open(&raw) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key, error = %e, "discarding unreadable stored value");
                    None
                }
            },
            None => Some(raw),
        }
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.set_many(&[(key, value)])
    }

    /// Writes every pair in one update. Nothing changes, in memory or on
    /// disk, when sealing or the write fails.
    pub fn set_many(&self, pairs: &[(&str, &str)]) -> Result<(), StorageError> {
        let stored = pairs
            .iter()
            .map(|(key, value)| Ok((key.to_string(), self.seal(value)?)))
            .collect::<Result<Vec<_>, StorageError>>()?;
        self.update(|entries| entries.extend(stored))
    }

    pub fn remove(&self, key: &str) -> Result<bool, StorageError> {
        self.update(|entries| entries.remove(key).is_some())
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.update(|entries| entries.clear())
    }

    /// [`LocalStore::set_many`] on the blocking pool.
    pub async fn set_many_async(
        self: Arc<Self>,
        pairs: Vec<(String, String)>,
    ) -> Result<(), StorageError> {
        task::spawn_blocking(move || {
            let pairs: Vec<(&str, &str)> = pairs
                .iter()
                .map(|(key, value)| (key.as_str(), value.as_str()))
                .collect();
            self.set_many(&pairs)
        })
        .await
        .map_err(|e| StorageError::Io(e.to_string()))?
    }

    /// [`LocalStore::remove`] on the blocking pool.
    pub async fn remove_async(self: Arc<Self>, key: String) -> Result<bool, StorageError> {
        task::spawn_blocking(move || self.remove(&key))
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?
    }

    fn seal(&self, value: &str) -> Result<String, StorageError> {
        match &self.sealer {
            Some(sealer) => sealer.seal(value),
            None => Ok(value.to_string()),
        }
    }

    /// Applies `f` to a copy of the entries and commits it only after the
    /// file is written. The write guard is held throughout, so updates reach
    /// the disk in the order they reach memory.
    fn update<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> R,
    ) -> Result<R, StorageError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let mut next = entries.clone();
        let out = f(&mut next);
        if next != *entries {
            self.persist(&next)?;
            *entries = next;
        }
        Ok(out)
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json =
            serde_json::to_string_pretty(entries).map_err(|e| StorageError::Io(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        fs::write(path, json).map_err(|e| StorageError::Io(e.to_string()))
    }
}
