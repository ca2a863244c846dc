//! Public façade over the queue, shadow cache, clock offset and live
//! subscriptions.
//!
//! The service is constructed explicitly from its collaborators and owns one
//! authenticated session at a time. Sign-in drives the lifecycle forward:
//! authenticate against the user's shard, replay queued updates, then attach
//! the registered listeners. Sign-out detaches everything and wipes both
//! durable namespaces so the next user starts clean.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use serde_json::{json, Value};
use sha1::{Digest, Sha1};

use crate::cache::{replay_from_cache, DeltaCallback, SubscriptionManager};
use crate::clock::ClockOffset;
use crate::constants::{CACHE_NAMESPACE, QUEUE_NAMESPACE};
use crate::error::{invalid_argument, not_authenticated, SyncErrorCode, SyncResult};
use crate::logger::Logger;
use crate::notify::{LoggerSink, NotificationSink};
use crate::path::{Collection, ItemId, UserScope};
use crate::queue::WriteQueue;
use crate::remote::{RemoteErrorCode, RemoteService};
use crate::server_value::server_timestamp;
use crate::store::{DurableStore, StoreHandle};

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("sync/api"));

const RETRY_NOTICE: &str = "The change will be saved on your next visit.";
const FAILURE_NOTICE: &str = "The change will be retried on your next visit.";

/// Lifecycle of the service, advanced by sign-in and reset by sign-out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncState {
    Unauthenticated,
    Authenticating,
    Replaying,
    Subscribed,
}

/// Everything the service needs, supplied by the embedding application.
pub struct SyncConfig {
    /// User data is spread over several shards; each user maps onto exactly
    /// one by a hash of their id.
    pub shards: Vec<Arc<dyn RemoteService>>,
    /// Durable backing for the queue and shadow-cache namespaces. `None`
    /// degrades to a memory-only session.
    pub store: Option<Arc<dyn DurableStore>>,
    pub notifications: Arc<dyn NotificationSink>,
}

impl SyncConfig {
    pub fn new(shards: Vec<Arc<dyn RemoteService>>) -> Self {
        Self {
            shards,
            store: None,
            notifications: Arc::new(LoggerSink),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_notifications(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifications = sink;
        self
    }
}

struct Session {
    scope: UserScope,
    remote: Arc<dyn RemoteService>,
    queue: WriteQueue,
    subscriptions: SubscriptionManager,
    clock: ClockOffset,
}

pub struct SyncService {
    shards: Vec<Arc<dyn RemoteService>>,
    notifications: Arc<dyn NotificationSink>,
    queue_store: Option<Arc<dyn StoreHandle>>,
    cache_store: Option<Arc<dyn StoreHandle>>,
    state: Mutex<SyncState>,
    session: Mutex<Option<Arc<Session>>>,
    registered: Mutex<HashMap<Collection, DeltaCallback>>,
}

impl SyncService {
    /// Opens the durable namespaces and builds an unauthenticated service. A
    /// store that cannot be opened is logged and the service runs without it.
    pub async fn new(config: SyncConfig) -> SyncResult<Self> {
        if config.shards.is_empty() {
            return Err(invalid_argument("At least one remote shard is required"));
        }

        let mut queue_store = None;
        let mut cache_store = None;
        if let Some(store) = &config.store {
            queue_store = Self::open_namespace(store, QUEUE_NAMESPACE).await;
            cache_store = Self::open_namespace(store, CACHE_NAMESPACE).await;
        }

        Ok(Self {
            shards: config.shards,
            notifications: config.notifications,
            queue_store,
            cache_store,
            state: Mutex::new(SyncState::Unauthenticated),
            session: Mutex::new(None),
            registered: Mutex::new(HashMap::new()),
        })
    }

    async fn open_namespace(
        store: &Arc<dyn DurableStore>,
        namespace: &str,
    ) -> Option<Arc<dyn StoreHandle>> {
        match store.open(namespace).await {
            Ok(handle) => Some(handle),
            Err(err) => {
                LOGGER.warn(format!("Cannot open namespace {namespace}: {err}"));
                None
            }
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.lock().unwrap()
    }

    fn set_state(&self, state: SyncState) {
        *self.state.lock().unwrap() = state;
    }

    /// The shard holding a given user's data. Stable across sessions and
    /// uniform enough to spread load.
    fn shard_for(&self, user_id: &str) -> Arc<dyn RemoteService> {
        let digest = Sha1::digest(user_id.as_bytes());
        let bucket = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
        self.shards[bucket as usize % self.shards.len()].clone()
    }

    fn active_session(&self) -> SyncResult<Arc<Session>> {
        self.session
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| not_authenticated("Sign in to sync your schedule"))
    }

    /// Starts a session for `user_id`. On success queued updates from earlier
    /// visits have been replayed and every registered listener is live.
    ///
    /// An unreachable shard does not fail sign-in: the session starts
    /// disconnected, writes queue durably, and no listeners attach.
    pub async fn signed_in(&self, user_id: &str, access_token: &str) -> SyncResult<()> {
        if self.session.lock().unwrap().is_some() {
            return Err(invalid_argument("A session is already active; sign out first"));
        }
        let scope = UserScope::new(user_id)?;
        self.set_state(SyncState::Authenticating);

        let remote = self.shard_for(scope.user_id());
        let connected = match remote.authenticate(user_id, access_token).await {
            Ok(()) => true,
            Err(err) if err.code == RemoteErrorCode::Unavailable => {
                LOGGER.warn(format!(
                    "Shard unreachable, starting {user_id} in offline mode: {err}"
                ));
                false
            }
            Err(err) => {
                self.set_state(SyncState::Unauthenticated);
                return Err(not_authenticated(format!("Sign-in rejected: {err}")));
            }
        };

        let queue = WriteQueue::new(remote.clone(), self.queue_store.clone());
        queue.set_connected(connected);
        let session = Arc::new(Session {
            scope,
            remote: remote.clone(),
            queue,
            subscriptions: SubscriptionManager::new(remote.clone(), self.cache_store.clone()),
            clock: ClockOffset::new(),
        });
        *self.session.lock().unwrap() = Some(session.clone());

        if connected {
            session.clock.refresh(&session.remote).await;
            self.set_state(SyncState::Replaying);
            if let Err(err) = session.queue.replay_all().await {
                LOGGER.warn(format!("Replay for {user_id} incomplete: {err}"));
                self.notifications.notify(FAILURE_NOTICE);
            }
            self.attach_registered(&session);
        }

        self.set_state(SyncState::Subscribed);
        LOGGER.info(format!(
            "Signed in {user_id} ({})",
            if connected { "online" } else { "offline" }
        ));
        Ok(())
    }

    fn attach_registered(&self, session: &Session) {
        let registered: Vec<(Collection, DeltaCallback)> = {
            let registered = self.registered.lock().unwrap();
            registered
                .iter()
                .map(|(collection, callback)| (*collection, callback.clone()))
                .collect()
        };
        for (collection, callback) in registered {
            let path = session.scope.collection_path(collection);
            if let Err(err) = session.subscriptions.subscribe(&path, callback) {
                LOGGER.warn(format!("Cannot attach listener for {path}: {err}"));
            }
        }
    }

    /// Ends the session: detaches every listener, wipes both durable
    /// namespaces so a subsequently signed-in user never sees or replays this
    /// user's state, and drops the credentials. Queued updates only survive a
    /// process exit without sign-out (crash, page close), not an explicit
    /// sign-out.
    pub async fn signed_out(&self) {
        let session = self.session.lock().unwrap().take();
        if let Some(session) = session {
            session.subscriptions.unsubscribe_all();
            session.subscriptions.clear().await;
            if let Some(store) = &self.queue_store {
                if let Err(err) = store.clear().await {
                    LOGGER.warn(format!("Failed to clear queued updates: {err}"));
                }
            }
            if let Err(err) = session.remote.unauthenticate().await {
                LOGGER.warn(format!("Unauthenticate failed: {err}"));
            }
            LOGGER.info(format!("Signed out {}", session.scope.user_id()));
        }
        self.set_state(SyncState::Unauthenticated);
    }

    /// Adds a session to or removes it from the user's schedule.
    ///
    /// `local_timestamp_millis` is the moment the user acted, measured on the
    /// local clock; it is adjusted by the session's server clock offset so
    /// last-write-wins ordering holds across devices. Without it the remote
    /// service stamps the write on arrival.
    pub async fn toggle_session(
        &self,
        session_id: &str,
        in_schedule: bool,
        local_timestamp_millis: Option<i64>,
    ) -> SyncResult<()> {
        let session = self.active_session()?;
        let timestamp = match local_timestamp_millis {
            Some(local) => json!(session.clock.adjust(local)),
            None => server_timestamp(),
        };
        let value = json!({ "in_schedule": in_schedule, "timestamp": timestamp });
        self.write_attribute(&session, Collection::MySessions, session_id, value)
            .await
    }

    /// Records that the user submitted feedback for a session. The remote
    /// service stamps the submission time on arrival.
    pub async fn mark_session_rated(&self, session_id: &str) -> SyncResult<()> {
        let session = self.active_session()?;
        let value = json!({ "rated": true, "timestamp": server_timestamp() });
        self.write_attribute(&session, Collection::Feedback, session_id, value)
            .await
    }

    /// Records that the user watched a session video.
    pub async fn mark_video_watched(&self, video_id: &str) -> SyncResult<()> {
        let session = self.active_session()?;
        self.write_attribute(&session, Collection::ViewedVideos, video_id, json!(true))
            .await
    }

    async fn write_attribute(
        &self,
        session: &Session,
        collection: Collection,
        item_id: &str,
        value: Value,
    ) -> SyncResult<()> {
        let path = session.scope.attribute(collection, ItemId::new(item_id)?);
        let result = session.queue.enqueue_and_write(&path, value).await;
        match &result {
            Ok(()) if !session.queue.is_connected() => {
                self.notifications.notify(RETRY_NOTICE);
            }
            Err(err) if err.code == SyncErrorCode::RemoteWriteFailed => {
                self.notifications.notify(FAILURE_NOTICE);
            }
            _ => {}
        }
        result
    }

    /// Registers the schedule listener. Live immediately if a connected
    /// session exists, otherwise attached on the next sign-in.
    pub fn register_session_updates(&self, callback: DeltaCallback) {
        self.register(Collection::MySessions, callback);
    }

    /// Registers the feedback listener.
    pub fn register_feedback_updates(&self, callback: DeltaCallback) {
        self.register(Collection::Feedback, callback);
    }

    /// Registers the watched-videos listener.
    pub fn register_video_watch_updates(&self, callback: DeltaCallback) {
        self.register(Collection::ViewedVideos, callback);
    }

    fn register(&self, collection: Collection, callback: DeltaCallback) {
        self.registered
            .lock()
            .unwrap()
            .insert(collection, callback.clone());

        let session = self.session.lock().unwrap().clone();
        if let Some(session) = session {
            if !session.queue.is_connected() {
                return;
            }
            let path = session.scope.collection_path(collection);
            session.subscriptions.unsubscribe(&path);
            if let Err(err) = session.subscriptions.subscribe(&path, callback) {
                LOGGER.warn(format!("Cannot attach listener for {path}: {err}"));
            }
        }
    }

    /// Replays the cached schedule for `user_id` at cold start, before any
    /// sign-in or network traffic.
    pub async fn replay_cached_sessions(
        &self,
        user_id: &str,
        callback: DeltaCallback,
    ) -> SyncResult<()> {
        self.replay_cached(Collection::MySessions, user_id, callback)
            .await
    }

    /// Replays cached feedback markers for `user_id` at cold start.
    pub async fn replay_cached_feedback(
        &self,
        user_id: &str,
        callback: DeltaCallback,
    ) -> SyncResult<()> {
        self.replay_cached(Collection::Feedback, user_id, callback)
            .await
    }

    /// Replays cached watched-video markers for `user_id` at cold start.
    pub async fn replay_cached_video_watches(
        &self,
        user_id: &str,
        callback: DeltaCallback,
    ) -> SyncResult<()> {
        self.replay_cached(Collection::ViewedVideos, user_id, callback)
            .await
    }

    async fn replay_cached(
        &self,
        collection: Collection,
        user_id: &str,
        callback: DeltaCallback,
    ) -> SyncResult<()> {
        let scope = UserScope::new(user_id)?;
        if let Some(store) = &self.cache_store {
            replay_from_cache(store, &scope.collection_path(collection), &callback).await;
        }
        Ok(())
    }

    /// Queued updates waiting for the next successful connection.
    pub async fn pending_updates(&self) -> usize {
        // The guard must not be held across the store await below.
        let session = self.session.lock().unwrap().clone();
        match session {
            Some(session) => session.queue.pending().await,
            None => match &self.queue_store {
                Some(store) => store
                    .entries()
                    .await
                    .map(|entries| entries.len())
                    .unwrap_or(0),
                None => 0,
            },
        }
    }

    /// Drops the session and all listeners without touching the network or
    /// durable state. For process shutdown, not for user sign-out.
    pub fn dispose(&self) {
        if let Some(session) = self.session.lock().unwrap().take() {
            session.subscriptions.unsubscribe_all();
        }
        self.registered.lock().unwrap().clear();
        self.set_state(SyncState::Unauthenticated);
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::remote::{
        ChildObserver, InMemoryRemote, RemoteResult, RemoteSubscription,
    };
    use crate::store::{MemoryStore, StoreResult};
    use crate::test_support::{recording_delta as recording, RecordingSink};
    use futures::executor::block_on;
    use serde_json::{json, Map};

    async fn service(remote: &InMemoryRemote) -> (SyncService, Arc<RecordingSink>) {
        let sink = RecordingSink::new();
        let config = SyncConfig::new(vec![Arc::new(remote.clone()) as Arc<dyn RemoteService>])
            .with_store(Arc::new(MemoryStore::new()))
            .with_notifications(sink.clone());
        (SyncService::new(config).await.unwrap(), sink)
    }

    #[test]
    fn requires_at_least_one_shard() {
        block_on(async {
            assert!(SyncService::new(SyncConfig::new(Vec::new())).await.is_err());
        });
    }

    #[test]
    fn writes_require_a_session() {
        block_on(async {
            let remote = InMemoryRemote::new();
            let (service, _) = service(&remote).await;
            let err = service.toggle_session("sess1", true, None).await.unwrap_err();
            assert_eq!(err.code, SyncErrorCode::NotAuthenticated);
        });
    }

    #[test]
    fn sign_in_reaches_subscribed_and_writes_land() {
        block_on(async {
            let remote = InMemoryRemote::new();
            let (service, _) = service(&remote).await;
            assert_eq!(service.state(), SyncState::Unauthenticated);

            service.signed_in("alice", "token").await.unwrap();
            assert_eq!(service.state(), SyncState::Subscribed);

            service.toggle_session("sess1", true, Some(1000)).await.unwrap();
            let stored = remote.value_at("users/alice/my_sessions/sess1");
            assert_eq!(stored["in_schedule"], json!(true));
            assert_eq!(stored["timestamp"], json!(1000));
            assert_eq!(service.pending_updates().await, 0);
        });
    }

    #[test]
    fn invalid_user_id_rejected_before_any_network() {
        block_on(async {
            let remote = InMemoryRemote::new();
            let (service, _) = service(&remote).await;
            let err = service.signed_in("", "token").await.unwrap_err();
            assert_eq!(err.code, SyncErrorCode::InvalidArgument);
            assert_eq!(service.state(), SyncState::Unauthenticated);
        });
    }

    #[test]
    fn unreachable_shard_degrades_to_offline_session() {
        block_on(async {
            let remote = InMemoryRemote::new();
            remote.set_offline(true);
            let (service, sink) = service(&remote).await;

            service.signed_in("alice", "token").await.unwrap();
            assert_eq!(service.state(), SyncState::Subscribed);

            service.mark_video_watched("vid1").await.unwrap();
            assert_eq!(service.pending_updates().await, 1);
            assert_eq!(remote.value_at("users/alice/viewed_videos/vid1"), Value::Null);
            assert_eq!(sink.messages.lock().unwrap().as_slice(), [RETRY_NOTICE]);
        });
    }

    #[test]
    fn queued_updates_replay_on_next_sign_in() {
        block_on(async {
            let remote = InMemoryRemote::new();
            remote.set_offline(true);
            let (service, _) = service(&remote).await;

            service.signed_in("alice", "token").await.unwrap();
            service.toggle_session("sess1", true, Some(42)).await.unwrap();
            // Process shutdown keeps the queue durable for the next visit.
            service.dispose();
            assert_eq!(service.pending_updates().await, 1);

            remote.set_offline(false);
            service.signed_in("alice", "token").await.unwrap();
            assert_eq!(service.pending_updates().await, 0);
            assert_eq!(
                remote.value_at("users/alice/my_sessions/sess1")["in_schedule"],
                json!(true)
            );
        });
    }

    #[test]
    fn sign_out_discards_queued_updates() {
        block_on(async {
            let remote = InMemoryRemote::new();
            remote.set_offline(true);
            let (service, _) = service(&remote).await;

            service.signed_in("alice", "token").await.unwrap();
            service.toggle_session("sess1", true, Some(42)).await.unwrap();
            assert_eq!(service.pending_updates().await, 1);

            service.signed_out().await;
            assert_eq!(service.pending_updates().await, 0);

            remote.set_offline(false);
            service.signed_in("bob", "token").await.unwrap();
            assert_eq!(remote.value_at("users/alice/my_sessions/sess1"), Value::Null);
        });
    }

    #[test]
    fn settled_failure_notifies_and_dequeues() {
        block_on(async {
            let remote = InMemoryRemote::new();
            remote.set_failing_paths(["users/alice/feedback/sess1".to_string()]);
            let (service, sink) = service(&remote).await;

            service.signed_in("alice", "token").await.unwrap();
            let err = service.mark_session_rated("sess1").await.unwrap_err();
            assert_eq!(err.code, SyncErrorCode::RemoteWriteFailed);
            assert_eq!(service.pending_updates().await, 0);
            assert_eq!(sink.messages.lock().unwrap().as_slice(), [FAILURE_NOTICE]);
        });
    }

    #[test]
    fn registered_listeners_attach_on_sign_in() {
        block_on(async {
            let remote = InMemoryRemote::new();
            let (service, _) = service(&remote).await;
            let (callback, seen) = recording();

            service.register_session_updates(callback);
            service.signed_in("alice", "token").await.unwrap();

            remote
                .write("users/alice/my_sessions/sess1", json!({"in_schedule": true}))
                .await
                .unwrap();
            assert_eq!(seen.lock().unwrap().len(), 1);
        });
    }

    #[test]
    fn sign_out_detaches_listeners_and_wipes_cached_reads() {
        block_on(async {
            let remote = InMemoryRemote::new();
            let (service, _) = service(&remote).await;
            let (callback, seen) = recording();

            service.register_feedback_updates(callback.clone());
            service.signed_in("alice", "token").await.unwrap();
            remote
                .write("users/alice/feedback/sess1", json!(true))
                .await
                .unwrap();
            service.signed_out().await;

            remote
                .write("users/alice/feedback/sess2", json!(true))
                .await
                .unwrap();
            assert_eq!(seen.lock().unwrap().len(), 1);

            // Cached reads were wiped, so a cold-start replay yields nothing.
            let (cold_callback, cold_seen) = recording();
            service
                .replay_cached_feedback("alice", cold_callback)
                .await
                .unwrap();
            assert!(cold_seen.lock().unwrap().is_empty());
        });
    }

    #[test]
    fn cold_start_replays_cached_reads_per_user() {
        block_on(async {
            let remote = InMemoryRemote::new();
            let (service, _) = service(&remote).await;
            let (live_callback, _) = recording();

            service.register_session_updates(live_callback);
            service.signed_in("alice", "token").await.unwrap();
            remote
                .write("users/alice/my_sessions/sess1", json!({"in_schedule": true}))
                .await
                .unwrap();
            service.dispose();

            let (callback, seen) = recording();
            service
                .replay_cached_sessions("alice", callback)
                .await
                .unwrap();
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].0, "sess1");
        });
    }

    #[test]
    fn shard_selection_is_stable() {
        block_on(async {
            let a = InMemoryRemote::new();
            let b = InMemoryRemote::new();
            let config = SyncConfig::new(vec![
                Arc::new(a.clone()) as Arc<dyn RemoteService>,
                Arc::new(b.clone()) as Arc<dyn RemoteService>,
            ]);
            let service = SyncService::new(config).await.unwrap();

            service.signed_in("alice", "token").await.unwrap();
            service.toggle_session("sess1", true, None).await.unwrap();

            let on_a = a.value_at("users/alice/my_sessions/sess1") != Value::Null;
            let on_b = b.value_at("users/alice/my_sessions/sess1") != Value::Null;
            assert!(on_a ^ on_b);
        });
    }

    /// Store backend whose snapshot read parks the calling thread, standing in
    /// for slow disk I/O.
    struct StallingStore;

    #[async_trait::async_trait]
    impl DurableStore for StallingStore {
        async fn open(&self, _namespace: &str) -> StoreResult<Arc<dyn StoreHandle>> {
            Ok(Arc::new(StallingHandle))
        }
    }

    struct StallingHandle;

    #[async_trait::async_trait]
    impl StoreHandle for StallingHandle {
        async fn get(&self, _key: &str) -> StoreResult<Option<Value>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: Value) -> StoreResult<()> {
            Ok(())
        }

        fn set_blocking(&self, _key: &str, _value: Value) -> StoreResult<()> {
            Ok(())
        }

        async fn delete(&self, _key: &str) -> StoreResult<()> {
            Ok(())
        }

        async fn entries(&self) -> StoreResult<Vec<(String, Value)>> {
            std::thread::sleep(Duration::from_millis(300));
            Ok(Vec::new())
        }

        async fn clear(&self) -> StoreResult<()> {
            Ok(())
        }
    }

    #[test]
    fn pending_updates_releases_the_session_lock_during_store_io() {
        let service = Arc::new(block_on(async {
            let remote = InMemoryRemote::new();
            let config = SyncConfig::new(vec![Arc::new(remote) as Arc<dyn RemoteService>])
                .with_store(Arc::new(StallingStore));
            SyncService::new(config).await.unwrap()
        }));

        let reader = service.clone();
        let pending = std::thread::spawn(move || block_on(reader.pending_updates()));

        // Give the reader time to park inside the store call, then make sure
        // other session operations are not stuck behind it.
        std::thread::sleep(Duration::from_millis(100));
        let started = Instant::now();
        service.dispose();
        let waited = started.elapsed();

        assert_eq!(pending.join().unwrap(), 0);
        assert!(
            waited < Duration::from_millis(150),
            "dispose blocked for {waited:?}"
        );
    }

    /// Delegates to an in-memory shard while recording the facade state seen
    /// at each clock-offset fetch.
    struct OffsetRecordingRemote {
        inner: InMemoryRemote,
        service: Arc<Mutex<Option<Arc<SyncService>>>>,
        states_at_offset: Arc<Mutex<Vec<SyncState>>>,
    }

    #[async_trait::async_trait]
    impl RemoteService for OffsetRecordingRemote {
        async fn authenticate(&self, user_id: &str, access_token: &str) -> RemoteResult<()> {
            self.inner.authenticate(user_id, access_token).await
        }

        async fn unauthenticate(&self) -> RemoteResult<()> {
            self.inner.unauthenticate().await
        }

        fn current_user_id(&self) -> Option<String> {
            self.inner.current_user_id()
        }

        async fn write(&self, path: &str, value: Value) -> RemoteResult<()> {
            self.inner.write(path, value).await
        }

        async fn update(&self, path: &str, updates: Map<String, Value>) -> RemoteResult<()> {
            self.inner.update(path, updates).await
        }

        async fn read(&self, path: &str) -> RemoteResult<Value> {
            self.inner.read(path).await
        }

        async fn server_time_offset(&self) -> RemoteResult<i64> {
            if let Some(service) = self.service.lock().unwrap().as_ref() {
                self.states_at_offset.lock().unwrap().push(service.state());
            }
            self.inner.server_time_offset().await
        }

        fn subscribe_child_events(
            &self,
            path: &str,
            observer: ChildObserver,
        ) -> RemoteResult<RemoteSubscription> {
            self.inner.subscribe_child_events(path, observer)
        }
    }

    #[test]
    fn clock_offset_is_fetched_while_authenticating() {
        block_on(async {
            let slot = Arc::new(Mutex::new(None));
            let states_at_offset = Arc::new(Mutex::new(Vec::new()));
            let remote = OffsetRecordingRemote {
                inner: InMemoryRemote::new(),
                service: slot.clone(),
                states_at_offset: states_at_offset.clone(),
            };
            let config = SyncConfig::new(vec![Arc::new(remote) as Arc<dyn RemoteService>]);
            let service = Arc::new(SyncService::new(config).await.unwrap());
            *slot.lock().unwrap() = Some(service.clone());

            service.signed_in("alice", "token").await.unwrap();
            assert_eq!(
                states_at_offset.lock().unwrap().as_slice(),
                [SyncState::Authenticating]
            );
        });
    }
}
