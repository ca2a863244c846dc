//! Read shadow cache and live-subscription management.
//!
//! Every delta received from a live collection listener is mirrored into the
//! durable cache namespace before the application callback sees it, so a cold
//! start can replay the last-known state before any connection exists.
//! Removals are stored as `Null` tombstones and skipped during replay.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::{invalid_argument, SyncResult};
use crate::logger::Logger;
use crate::remote::{ChildObserver, RemoteService, RemoteSubscription};
use crate::store::StoreHandle;

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("sync/cache"));

/// Application-facing delta callback: `(item key, new value)` with `None`
/// meaning the item was removed upstream.
pub type DeltaCallback = Arc<dyn Fn(&str, Option<&Value>) + Send + Sync>;

pub struct SubscriptionManager {
    remote: Arc<dyn RemoteService>,
    store: Option<Arc<dyn StoreHandle>>,
    active: Mutex<HashMap<String, RemoteSubscription>>,
}

impl SubscriptionManager {
    pub fn new(remote: Arc<dyn RemoteService>, store: Option<Arc<dyn StoreHandle>>) -> Self {
        Self {
            remote,
            store,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Attaches a live listener for the children of `collection_path`. Each
    /// delta is made durable in the shadow cache before `callback` runs.
    ///
    /// At most one subscription per collection path may be active;
    /// re-subscribing without unsubscribing is a caller error.
    pub fn subscribe(&self, collection_path: &str, callback: DeltaCallback) -> SyncResult<()> {
        let mut active = self.active.lock().unwrap();
        if active.contains_key(collection_path) {
            return Err(invalid_argument(format!(
                "Already subscribed to {collection_path}"
            )));
        }

        let store = self.store.clone();
        let prefix = collection_path.to_string();
        let observer: ChildObserver = Arc::new(move |event| {
            let cache_key = format!("{prefix}/{}", event.key());
            let cached = event.value().cloned().unwrap_or(Value::Null);
            if let Some(store) = &store {
                if let Err(err) = store.set_blocking(&cache_key, cached) {
                    LOGGER.warn(format!("Failed to mirror {cache_key}: {err}"));
                }
            }
            callback(event.key(), event.value());
        });

        let subscription = self
            .remote
            .subscribe_child_events(collection_path, observer)
            .map_err(|err| {
                invalid_argument(format!("Cannot subscribe to {collection_path}: {err}"))
            })?;
        active.insert(collection_path.to_string(), subscription);
        Ok(())
    }

    /// Detaches the listener for one collection path, if any.
    pub fn unsubscribe(&self, collection_path: &str) {
        if let Some(subscription) = self.active.lock().unwrap().remove(collection_path) {
            subscription.detach();
        }
    }

    /// Detaches every live listener. Called on sign-out so no callback fires
    /// against a stale session.
    pub fn unsubscribe_all(&self) {
        let subscriptions: Vec<RemoteSubscription> = {
            let mut active = self.active.lock().unwrap();
            active.drain().map(|(_, subscription)| subscription).collect()
        };
        for subscription in subscriptions {
            subscription.detach();
        }
    }

    /// Wipes the shadow-cache namespace (sign-out path, so the next user
    /// never sees this user's state).
    pub async fn clear(&self) {
        if let Some(store) = &self.store {
            if let Err(err) = store.clear().await {
                LOGGER.warn(format!("Failed to clear shadow cache: {err}"));
            }
        }
    }
}

/// Replays the last-known state of `collection_path` from the shadow cache.
/// Runs before any live connection or sign-in exists, so it only needs the
/// cache namespace. Tombstoned entries are never reported.
pub async fn replay_from_cache(
    store: &Arc<dyn StoreHandle>,
    collection_path: &str,
    callback: &DeltaCallback,
) {
    let entries = match store.entries().await {
        Ok(entries) => entries,
        Err(err) => {
            LOGGER.warn(format!("Cannot read shadow cache: {err}"));
            return;
        }
    };

    let prefix = format!("{collection_path}/");
    for (cache_key, value) in entries {
        if value.is_null() {
            continue;
        }
        if let Some(item_key) = cache_key.strip_prefix(&prefix) {
            callback(item_key, Some(&value));
        }
    }
}
