use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_lock::Mutex;
use async_trait::async_trait;
use serde_json::Value;

use crate::store::{DurableStore, StoreHandle, StoreResult};

/// Process-local store used in tests and as a fallback when no persistent
/// backend is configured. Namespaces share one registry so reopening a
/// namespace yields the same data.
#[derive(Default)]
pub struct MemoryStore {
    namespaces: Mutex<HashMap<String, Arc<MemoryNamespace>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn open(&self, namespace: &str) -> StoreResult<Arc<dyn StoreHandle>> {
        let mut namespaces = self.namespaces.lock().await;
        let handle = namespaces
            .entry(namespace.to_string())
            .or_insert_with(|| Arc::new(MemoryNamespace::default()))
            .clone();
        Ok(handle as Arc<dyn StoreHandle>)
    }
}

#[derive(Default)]
struct MemoryNamespace {
    entries: Mutex<BTreeMap<String, Value>>,
}

#[async_trait]
impl StoreHandle for MemoryNamespace {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    fn set_blocking(&self, key: &str, value: Value) -> StoreResult<()> {
        self.entries.lock_blocking().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().await.remove(key);
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
        self.entries.lock().await.clear();
        Ok(())
    }
}
