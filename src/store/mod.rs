//! Durable key-value storage for the write queue and the read shadow cache.
//!
//! The sync core never assumes persistence is available: a missing or broken
//! store degrades queuing and caching to best-effort, it never fails a write
//! attempt. Both built-in backends key values by plain strings and store
//! `serde_json::Value` payloads; each namespace is owned exclusively by one
//! component (the queue or the cache).

mod file;
mod memory;

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreErrorCode {
    Unavailable,
    Internal,
}

impl StoreErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreErrorCode::Unavailable => "store/unavailable",
            StoreErrorCode::Internal => "store/internal",
        }
    }
}

#[derive(Clone, Debug)]
pub struct StoreError {
    pub code: StoreErrorCode,
    message: String,
}

impl StoreError {
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code.as_str())
    }
}

impl std::error::Error for StoreError {}

pub type StoreResult<T> = Result<T, StoreError>;

pub fn store_unavailable(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::Unavailable, message)
}

pub fn store_internal(message: impl Into<String>) -> StoreError {
    StoreError::new(StoreErrorCode::Internal, message)
}

/// Factory for namespaced key-value handles.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Opens (creating if needed) the namespace and returns a handle to it.
    /// Repeated opens of the same namespace observe the same data.
    async fn open(&self, namespace: &str) -> StoreResult<Arc<dyn StoreHandle>>;
}

/// A single namespace of the durable store.
#[async_trait]
pub trait StoreHandle: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Synchronous variant of [`set`](Self::set) for callers inside listener
    /// callbacks, where no executor may be entered.
    fn set_blocking(&self, key: &str, value: Value) -> StoreResult<()>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Returns a point-in-time snapshot of every entry. Callers iterating the
    /// result never observe entries inserted after the call, which is what
    /// queue replay relies on.
    async fn entries(&self) -> StoreResult<Vec<(String, Value)>>;

    async fn clear(&self) -> StoreResult<()>;
}
