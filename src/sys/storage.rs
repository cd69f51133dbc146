//! Asynchronous key/value storage with change notifications.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::common::collections::BTreeMap;

pub type Entries = Map<String, Value>;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

/// One batch of changed keys, as produced by a single `set`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StorageChange {
    pub changes: BTreeMap<String, ValueChange>,
}

impl StorageChange {
    pub fn touches(&self, key: &str) -> bool { self.changes.contains_key(key) }

    pub fn touches_any(&self, keys: &[&str]) -> bool { keys.iter().any(|k| self.touches(k)) }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("failed to encode value for {key}: {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("storage file error: {0}")]
    Io(#[from] std::io::Error),
}

#[allow(async_fn_in_trait)]
pub trait ConfigStore {
    /// Returns the stored subset of `keys`. Missing keys are simply absent.
    async fn get(&self, keys: &[&str]) -> Result<Entries, StoreError>;

    /// Writes every entry in one call; subscribers see one change batch.
    async fn set(&self, items: Entries) -> Result<(), StoreError>;

    fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

#[derive(Debug)]
struct Inner {
    entries: Mutex<Entries>,
    available: AtomicBool,
    changes: broadcast::Sender<StorageChange>,
}

#[derive(Clone, Debug)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl Default for MemoryStore {
    fn default() -> Self { Self::with_entries(Entries::new()) }
}

impl MemoryStore {
    pub fn with_entries(entries: Entries) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        MemoryStore {
            inner: Arc::new(Inner {
                entries: Mutex::new(entries),
                available: AtomicBool::new(true),
                changes,
            }),
        }
    }

    /// Makes every subsequent call fail with `Unavailable` until re-enabled.
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Entries { self.inner.entries.lock().clone() }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.inner.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store disabled".to_owned()))
        }
    }

    fn apply(&self, items: Entries) -> StorageChange {
        let mut entries = self.inner.entries.lock();
        let mut change = StorageChange::default();
        for (key, value) in items {
            let old = entries.insert(key.clone(), value.clone());
            if old.as_ref() != Some(&value) {
                change.changes.insert(key, ValueChange { old_value: old, new_value: Some(value) });
            }
        }
        change
    }

    fn notify(&self, change: StorageChange) {
        if change.changes.is_empty() {
            return;
        }
        trace!(keys = ?change.changes.keys().collect::<Vec<_>>(), "storage changed");
        // No subscribers is fine.
        let _ = self.inner.changes.send(change);
    }
}

impl ConfigStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<Entries, StoreError> {
        self.check_available()?;
        let entries = self.inner.entries.lock();
        Ok(keys
            .iter()
            .filter_map(|k| entries.get(*k).map(|v| ((*k).to_owned(), v.clone())))
            .collect())
    }

    async fn set(&self, items: Entries) -> Result<(), StoreError> {
        self.check_available()?;
        let change = self.apply(items);
        self.notify(change);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> { self.inner.changes.subscribe() }
}

/// A store persisted as one JSON object on disk, rewritten after every `set`.
///
/// Memory only changes once the file write succeeded, so readers never see
/// values that were not persisted.
#[derive(Clone, Debug)]
pub struct FileStore {
    memory: MemoryStore,
    path: PathBuf,
    writing: Arc<tokio::sync::Mutex<()>>,
}

impl FileStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<Entries>(&bytes).map_err(|source| {
                StoreError::Codec { key: path.display().to_string(), source }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "store file missing; starting empty");
                Entries::new()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(FileStore {
            memory: MemoryStore::with_entries(entries),
            path,
            writing: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path { &self.path }

    async fn write(&self, snapshot: &Entries) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(snapshot).map_err(|source| StoreError::Codec {
            key: self.path.display().to_string(),
            source,
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

impl ConfigStore for FileStore {
    async fn get(&self, keys: &[&str]) -> Result<Entries, StoreError> { self.memory.get(keys).await }

    async fn set(&self, items: Entries) -> Result<(), StoreError> {
        self.memory.check_available()?;
        // Sets are serialized so a staged snapshot cannot drop a concurrent write.
        let _writing = self.writing.lock().await;
        let mut staged = self.memory.snapshot();
        staged.extend(items.clone());
        self.write(&staged).await?;
        let change = self.memory.apply(items);
        self.memory.notify(change);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StorageChange> { self.memory.subscribe() }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn entries(value: Value) -> Entries {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn get_returns_only_present_keys() {
        let store = MemoryStore::with_entries(entries(json!({ "a": 1, "b": 2 })));
        let got = store.get(&["a", "missing"]).await.unwrap();
        assert_eq!(Value::Object(got), json!({ "a": 1 }));
    }

    #[tokio::test]
    async fn set_notifies_changed_keys_once() {
        let store = MemoryStore::with_entries(entries(json!({ "a": 1 })));
        let mut rx = store.subscribe();

        store.set(entries(json!({ "a": 1, "b": true }))).await.unwrap();
        let change = rx.recv().await.unwrap();
        assert_eq!(change.changes.keys().collect::<Vec<_>>(), vec!["b"]);
        assert!(change.touches("b"));

        store.set(entries(json!({ "b": true }))).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unavailable_store_fails_every_call() {
        let store = MemoryStore::default();
        store.set_available(false);
        assert!(matches!(store.get(&["a"]).await, Err(StoreError::Unavailable(_))));
        assert!(matches!(store.set(Entries::new()).await, Err(StoreError::Unavailable(_))));
        store.set_available(true);
        assert!(store.get(&["a"]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("storage.json");

        let store = FileStore::open(&path).await.unwrap();
        store.set(entries(json!({ "previewModeEnable": false }))).await.unwrap();

        let reopened = FileStore::open(&path).await.unwrap();
        let got = reopened.get(&["previewModeEnable"]).await.unwrap();
        assert_eq!(Value::Object(got), json!({ "previewModeEnable": false }));
    }

    #[tokio::test]
    async fn failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        let store = FileStore::open(blocker.join("storage.json")).await.unwrap();
        store.set(entries(json!({ "previewModeEnable": true }))).await.unwrap();
        let mut rx = store.subscribe();

        tokio::fs::remove_dir_all(&blocker).await.unwrap();
        tokio::fs::write(&blocker, b"not a directory").await.unwrap();

        let result = store.set(entries(json!({ "previewModeEnable": false }))).await;
        assert!(matches!(result, Err(StoreError::Io(_))));
        let got = store.get(&["previewModeEnable"]).await.unwrap();
        assert_eq!(Value::Object(got), json!({ "previewModeEnable": true }));
        assert!(rx.try_recv().is_err());
    }
}
