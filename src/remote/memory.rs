use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Number, Value};

use crate::remote::{
    diff_children, unavailable, ChildEvent, ChildObserver, RemoteResult, RemoteService,
    RemoteSubscription,
};
use crate::server_value::is_server_timestamp;

/// Remote service simulator backed by an in-process JSON tree.
///
/// Tests and offline development use it to script the conditions the sync
/// core must survive: network loss (`set_offline`), a skewed server clock
/// (`set_clock_skew_millis`), and upstream removals (`remove`).
#[derive(Clone)]
pub struct InMemoryRemote {
    inner: Arc<RemoteInner>,
}

struct RemoteInner {
    data: Mutex<Value>,
    listeners: Mutex<HashMap<u64, ListenerEntry>>,
    next_listener_id: AtomicU64,
    offline: AtomicBool,
    clock_skew_millis: AtomicI64,
    current_user: Mutex<Option<String>>,
    failing_paths: Mutex<HashSet<String>>,
}

struct ListenerEntry {
    path: String,
    observer: ChildObserver,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RemoteInner {
                data: Mutex::new(Value::Object(Default::default())),
                listeners: Mutex::new(HashMap::new()),
                next_listener_id: AtomicU64::new(1),
                offline: AtomicBool::new(false),
                clock_skew_millis: AtomicI64::new(0),
                current_user: Mutex::new(None),
                failing_paths: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// While offline every network-facing operation fails with
    /// `remote/unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Delta added to the local clock to produce this service's notion of
    /// "server time".
    pub fn set_clock_skew_millis(&self, skew: i64) {
        self.inner.clock_skew_millis.store(skew, Ordering::SeqCst);
    }

    /// Makes writes to exactly these paths fail while everything else keeps
    /// working, for exercising partial replay failures.
    pub fn set_failing_paths(&self, paths: impl IntoIterator<Item = String>) {
        *self.inner.failing_paths.lock().unwrap() = paths.into_iter().collect();
    }

    /// Current value at `path`, `Null` when absent. Test-facing.
    pub fn value_at(&self, path: &str) -> Value {
        let data = self.inner.data.lock().unwrap();
        get_at_path(&data, &segments(path))
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Deletes `path` upstream and notifies listeners with `Removed` events,
    /// as the vendor service does when another client removes an item.
    pub fn remove(&self, path: &str) {
        let path_segments = segments(path);
        let old_root;
        let new_root;
        {
            let mut data = self.inner.data.lock().unwrap();
            old_root = data.clone();
            delete_at_path(&mut data, &path_segments);
            new_root = data.clone();
        }
        self.dispatch(&old_root, &new_root);
    }

    fn check_online(&self) -> RemoteResult<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            Err(unavailable("Remote service is unreachable"))
        } else {
            Ok(())
        }
    }

    fn server_now_millis(&self) -> i64 {
        Utc::now().timestamp_millis() + self.inner.clock_skew_millis.load(Ordering::SeqCst)
    }

    /// Replaces every server-timestamp sentinel in `value` with the simulated
    /// server clock, the way the vendor service resolves `ServerValue` writes.
    fn resolve_server_values(&self, value: Value) -> Value {
        if is_server_timestamp(&value) {
            return Value::Number(Number::from(self.server_now_millis()));
        }
        match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, child)| (key, self.resolve_server_values(child)))
                    .collect(),
            ),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|child| self.resolve_server_values(child))
                    .collect(),
            ),
            other => other,
        }
    }

    fn apply(&self, mutate: impl FnOnce(&mut Value)) {
        let old_root;
        let new_root;
        {
            let mut data = self.inner.data.lock().unwrap();
            old_root = data.clone();
            mutate(&mut data);
            new_root = data.clone();
        }
        self.dispatch(&old_root, &new_root);
    }

    fn dispatch(&self, old_root: &Value, new_root: &Value) {
        let listeners: Vec<(String, ChildObserver)> = {
            let listeners = self.inner.listeners.lock().unwrap();
            listeners
                .values()
                .map(|entry| (entry.path.clone(), entry.observer.clone()))
                .collect()
        };

        for (path, observer) in listeners {
            let path_segments = segments(&path);
            let old_subtree = get_at_path(old_root, &path_segments)
                .cloned()
                .unwrap_or(Value::Null);
            let new_subtree = get_at_path(new_root, &path_segments)
                .cloned()
                .unwrap_or(Value::Null);
            diff_children(&old_subtree, &new_subtree, &observer);
        }
    }
}

#[async_trait]
impl RemoteService for InMemoryRemote {
    async fn authenticate(&self, user_id: &str, _access_token: &str) -> RemoteResult<()> {
        self.check_online()?;
        *self.inner.current_user.lock().unwrap() = Some(user_id.to_string());
        Ok(())
    }

    async fn unauthenticate(&self) -> RemoteResult<()> {
        self.inner.current_user.lock().unwrap().take();
        Ok(())
    }

    fn current_user_id(&self) -> Option<String> {
        self.inner.current_user.lock().unwrap().clone()
    }

    async fn write(&self, path: &str, value: Value) -> RemoteResult<()> {
        self.check_online()?;
        if self
            .inner
            .failing_paths
            .lock()
            .unwrap()
            .contains(path.trim_matches('/'))
        {
            return Err(unavailable(format!("Write to {path} rejected")));
        }
        let resolved = self.resolve_server_values(value);
        let path_segments = segments(path);
        self.apply(|data| set_at_path(data, &path_segments, resolved));
        Ok(())
    }

    async fn update(&self, path: &str, updates: Map<String, Value>) -> RemoteResult<()> {
        self.check_online()?;
        let base = segments(path);
        let resolved: Vec<(Vec<String>, Value)> = updates
            .into_iter()
            .map(|(key, value)| {
                let mut target = base.clone();
                target.extend(segments(&key));
                (target, self.resolve_server_values(value))
            })
            .collect();
        self.apply(|data| {
            for (target, value) in resolved {
                set_at_path(data, &target, value);
            }
        });
        Ok(())
    }

    async fn read(&self, path: &str) -> RemoteResult<Value> {
        self.check_online()?;
        Ok(self.value_at(path))
    }

    async fn server_time_offset(&self) -> RemoteResult<i64> {
        self.check_online()?;
        Ok(self.inner.clock_skew_millis.load(Ordering::SeqCst))
    }

    fn subscribe_child_events(
        &self,
        path: &str,
        observer: ChildObserver,
    ) -> RemoteResult<RemoteSubscription> {
        self.check_online()?;

        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut listeners = self.inner.listeners.lock().unwrap();
            listeners.insert(
                id,
                ListenerEntry {
                    path: path.to_string(),
                    observer: observer.clone(),
                },
            );
        }

        // A fresh listener sees the current children as Added events so it
        // converges on the authoritative server state.
        let current = self.value_at(path);
        for (key, value) in super::children_map(&current) {
            observer(ChildEvent::Added { key, value });
        }

        let weak: Weak<RemoteInner> = Arc::downgrade(&self.inner);
        Ok(RemoteSubscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.listeners.lock().unwrap().remove(&id);
            }
        }))
    }
}

fn segments(path: &str) -> Vec<String> {
    path.trim_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

fn set_at_path(root: &mut Value, path: &[String], value: Value) {
    if path.is_empty() {
        *root = value;
        return;
    }

    let mut current = root;
    for segment in &path[..path.len() - 1] {
        if !current.is_object() {
            *current = Value::Object(Default::default());
        }
        let obj = current.as_object_mut().unwrap();
        current = obj
            .entry(segment)
            .or_insert(Value::Object(Default::default()));
    }

    if !current.is_object() {
        *current = Value::Object(Default::default());
    }
    current
        .as_object_mut()
        .unwrap()
        .insert(path.last().unwrap().clone(), value);
}

fn get_at_path<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = root;
    for segment in path {
        match current {
            Value::Object(obj) => current = obj.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

fn delete_at_path(root: &mut Value, path: &[String]) {
    if path.is_empty() {
        *root = Value::Null;
        return;
    }

    let mut current = root;
    for segment in &path[..path.len() - 1] {
        match current {
            Value::Object(obj) => match obj.get_mut(segment) {
                Some(next) => current = next,
                None => return,
            },
            _ => return,
        }
    }

    if let Value::Object(obj) = current {
        obj.remove(path.last().unwrap());
    }
}
