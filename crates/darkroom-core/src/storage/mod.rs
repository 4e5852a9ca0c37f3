//! Durable key-value storage shared between application instances.
//!
//! A [`StorageHub`] pairs a store with a broadcast channel. Every write is
//! announced to all subscribers, which is how independent instances sharing
//! the same store (the equivalent of same-origin browser tabs) learn about
//! each other's changes. Delivery is asynchronous, so two instances may
//! briefly disagree until the event is processed.

mod appearance;

pub use appearance::{Appearance, APPEARANCE_KEY};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{DarkroomError, Result};

/// A synchronous string key-value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Check that `key` can name a file in any store: ASCII letters, digits,
/// `-`, `_` and `.`, not empty and not starting with `.`.
pub fn validate_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(DarkroomError::InvalidArgument(format!(
            "Invalid storage key: {:?}",
            key
        )))
    }
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the OS data directory (`<data dir>/darkroom`).
    pub fn default_location() -> Result<Self> {
        let base = dirs::data_dir().ok_or_else(|| {
            DarkroomError::Storage("Could not determine the user data directory".to_string())
        })?;
        Ok(Self::new(base.join(crate::config::APP_DIR_NAME)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(path, value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// A change announced through a [`StorageHub`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    /// New value, `None` when the key was removed.
    pub value: Option<String>,
    /// Instance that made the change.
    pub origin: Uuid,
}

/// A store plus a change broadcast.
#[derive(Clone)]
pub struct StorageHub {
    store: Arc<dyn KeyValueStore>,
    events: broadcast::Sender<StorageEvent>,
}

impl StorageHub {
    /// Channel capacity; slower listeners that fall behind resynchronise from the store.
    const CAPACITY: usize = 64;

    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let (events, _) = broadcast::channel(Self::CAPACITY);
        Self { store, events }
    }

    /// Hub over a fresh in-memory store.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.store.get(key)
    }

    /// Write and announce a value.
    pub fn set(&self, key: &str, value: &str, origin: Uuid) -> Result<()> {
        self.store.set(key, value)?;
        self.announce(StorageEvent {
            key: key.to_string(),
            value: Some(value.to_string()),
            origin,
        });
        Ok(())
    }

    /// Remove and announce a key.
    pub fn remove(&self, key: &str, origin: Uuid) -> Result<()> {
        self.store.remove(key)?;
        self.announce(StorageEvent {
            key: key.to_string(),
            value: None,
            origin,
        });
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.events.subscribe()
    }

    fn announce(&self, event: StorageEvent) {
        // No listeners is not an error.
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for StorageHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageHub")
            .field("receivers", &self.events.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state"));

        assert_eq!(store.get("session").unwrap(), None);
        store.set("session", r#"{"user":null}"#).unwrap();
        assert_eq!(
            store.get("session").unwrap().as_deref(),
            Some(r#"{"user":null}"#)
        );
        assert!(dir.path().join("state/session.json").exists());

        store.remove("session").unwrap();
        assert_eq!(store.get("session").unwrap(), None);
        // Removing twice is fine.
        store.remove("session").unwrap();
    }

    #[test]
    fn test_file_store_rejects_path_like_keys() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.set("../escape", "x").is_err());
        assert!(store.set("", "x").is_err());
        assert!(store.get(".hidden").is_err());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        store.remove("k").unwrap();
        assert_eq!(store.get("k").unwrap(), None);
    }

    #[tokio::test]
    async fn test_hub_announces_changes() {
        let hub = StorageHub::in_memory();
        let mut rx = hub.subscribe();
        let origin = Uuid::new_v4();

        hub.set("auth", "{}", origin).unwrap();
        hub.remove("auth", origin).unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.key, "auth");
        assert_eq!(first.value.as_deref(), Some("{}"));
        assert_eq!(first.origin, origin);

        let second = rx.recv().await.unwrap();
        assert_eq!(second.value, None);
        assert_eq!(hub.get("auth").unwrap(), None);
    }
}
