//! Durable write queue and replay engine.
//!
//! Every outbound mutation is persisted (keyed by its rendered attribute
//! path, last write wins) before the network attempt, so a crash between
//! persist and delivery loses nothing: the next replay re-issues it. Once the
//! remote write settles the queued snapshot is deleted on success *and* on
//! failure: one attempt, no retry history. A write composed while the
//! session has no live connection skips the attempt and stays queued for the
//! next visit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::{remote_write_failed, replay_partial_failure, SyncResult};
use crate::logger::Logger;
use crate::path::AttributePath;
use crate::remote::RemoteService;
use crate::store::StoreHandle;

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("sync/queue"));

pub struct WriteQueue {
    remote: Arc<dyn RemoteService>,
    store: Option<Arc<dyn StoreHandle>>,
    connected: AtomicBool,
}

impl WriteQueue {
    /// `store` is `None` when the durable store was unavailable at session
    /// start: queuing degrades to best-effort and writes go straight to the
    /// network.
    pub fn new(remote: Arc<dyn RemoteService>, store: Option<Arc<dyn StoreHandle>>) -> Self {
        if store.is_none() {
            LOGGER.warn("Durable store unavailable; queuing writes best-effort only");
        }
        Self {
            remote,
            store,
            connected: AtomicBool::new(false),
        }
    }

    /// Whether a live remote connection exists. While disconnected,
    /// mutations are queued without a delivery attempt.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Persists the mutation, then attempts delivery if connected.
    ///
    /// Not reentrant-safe for the same attribute path: a second call before
    /// the first one's persist completes can lose the earlier snapshot.
    /// Callers serialize same-path writes.
    pub async fn enqueue_and_write(&self, path: &AttributePath, value: Value) -> SyncResult<()> {
        self.write_keyed(&path.render(), value).await
    }

    async fn write_keyed(&self, key: &str, value: Value) -> SyncResult<()> {
        // The persist must land before the network call fires; a store
        // failure is logged and the attempt proceeds without durability.
        if let Some(store) = &self.store {
            if let Err(err) = store.set(key, value.clone()).await {
                LOGGER.warn(format!("Failed to queue {key}: {err}"));
            }
        }

        if !self.is_connected() {
            LOGGER.info(format!("No live connection; {key} queued for next visit"));
            return Ok(());
        }

        let outcome = self.remote.write(key, value).await;

        // Dequeue on any settled outcome; a rejected write is reported, not
        // retried.
        if let Some(store) = &self.store {
            if let Err(err) = store.delete(key).await {
                LOGGER.warn(format!("Failed to dequeue {key}: {err}"));
            }
        }

        outcome.map_err(remote_write_failed)
    }

    /// Re-issues every queued mutation concurrently. Each one independently
    /// succeeds or fails and is dequeued either way; failures are counted and
    /// reported as a partial-failure error without aborting the rest.
    pub async fn replay_all(&self) -> SyncResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let queued = match store.entries().await {
            Ok(entries) => entries,
            Err(err) => {
                LOGGER.warn(format!("Cannot read queued updates: {err}"));
                return Ok(());
            }
        };
        if queued.is_empty() {
            return Ok(());
        }

        let total = queued.len();
        let failures: usize = stream::iter(queued)
            .map(|(key, value)| async move {
                match self.write_keyed(&key, value).await {
                    Ok(()) => 0usize,
                    Err(err) => {
                        LOGGER.warn(format!("Replay of {key} failed: {err}"));
                        1
                    }
                }
            })
            .buffer_unordered(total)
            .fold(0, |acc, failed| async move { acc + failed })
            .await;

        if failures > 0 {
            Err(replay_partial_failure(failures, total))
        } else {
            LOGGER.info(format!("Replayed {total} queued updates"));
            Ok(())
        }
    }

    /// Number of currently queued mutations.
    pub async fn pending(&self) -> usize {
        match &self.store {
            Some(store) => store.entries().await.map(|entries| entries.len()).unwrap_or(0),
            None => 0,
        }
    }
}
