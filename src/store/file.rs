use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_lock::Mutex;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::logger::Logger;
use crate::store::{
    store_internal, store_unavailable, DurableStore, StoreHandle, StoreResult,
};

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("sync/store"));

/// Durable store writing one JSON document per namespace under a root
/// directory. This is the native stand-in for the browser original's
/// IndexedDB databases: entries survive process restarts, which is what the
/// crash-safety guarantee of the write queue depends on.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Creates the root directory if needed. Failure here is the
    /// "persistence unavailable" signal callers degrade on.
    pub fn new(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| {
            store_unavailable(format!(
                "Cannot create store directory {}: {err}",
                root.display()
            ))
        })?;
        Ok(Self { root })
    }

    fn namespace_path(&self, namespace: &str) -> StoreResult<PathBuf> {
        if namespace.is_empty()
            || !namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(store_internal(format!(
                "Invalid store namespace '{namespace}'"
            )));
        }
        Ok(self.root.join(format!("{namespace}.json")))
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn open(&self, namespace: &str) -> StoreResult<Arc<dyn StoreHandle>> {
        let path = self.namespace_path(namespace)?;
        let entries = load_entries(&path)?;
        Ok(Arc::new(FileNamespace {
            path,
            entries: Mutex::new(entries),
        }) as Arc<dyn StoreHandle>)
    }
}

struct FileNamespace {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, Value>>,
}

impl FileNamespace {
    fn flush(&self, entries: &BTreeMap<String, Value>) -> StoreResult<()> {
        let serialized = serde_json::to_vec_pretty(entries)
            .map_err(|err| store_internal(format!("Failed to serialize namespace: {err}")))?;
        // Write-then-rename so a crash mid-write never truncates the live file.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, serialized).map_err(|err| {
            store_unavailable(format!(
                "Failed to write {}: {err}",
                staging.display()
            ))
        })?;
        fs::rename(&staging, &self.path).map_err(|err| {
            store_unavailable(format!(
                "Failed to replace {}: {err}",
                self.path.display()
            ))
        })
    }
}

#[async_trait]
impl StoreHandle for FileNamespace {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }

    fn set_blocking(&self, key: &str, value: Value) -> StoreResult<()> {
        let mut entries = self.entries.lock_blocking();
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    async fn entries(&self) -> StoreResult<Vec<(String, Value)>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn clear(&self) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        entries.clear();
        self.flush(&entries)
    }
}

fn load_entries(path: &Path) -> StoreResult<BTreeMap<String, Value>> {
    match fs::read(path) {
        Ok(raw) => match serde_json::from_slice(&raw) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                // A corrupt namespace file loses queued state but must not
                // wedge the sync core; start over and say so.
                LOGGER.warn(format!(
                    "Discarding corrupt namespace file {}: {err}",
                    path.display()
                ));
                Ok(BTreeMap::new())
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(err) => Err(store_unavailable(format!(
            "Failed to read {}: {err}",
            path.display()
        ))),
    }
}
