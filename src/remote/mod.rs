//! Contract for the remote data service the sync core writes to and
//! subscribes against.
//!
//! The core consumes this interface, it does not implement the vendor
//! service: [`InMemoryRemote`] simulates one for tests and offline
//! development, [`RestRemote`] speaks an RTDB-style REST surface. Child
//! change notification is an explicit event stream: a tagged [`ChildEvent`]
//! delivered to an observer and cancelled through the returned
//! [`RemoteSubscription`] handle.

mod memory;
mod rest;

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use memory::InMemoryRemote;
pub use rest::RestRemote;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteErrorCode {
    PermissionDenied,
    Unavailable,
    InvalidArgument,
    Internal,
}

impl RemoteErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteErrorCode::PermissionDenied => "remote/permission-denied",
            RemoteErrorCode::Unavailable => "remote/unavailable",
            RemoteErrorCode::InvalidArgument => "remote/invalid-argument",
            RemoteErrorCode::Internal => "remote/internal",
        }
    }
}

#[derive(Clone, Debug)]
pub struct RemoteError {
    pub code: RemoteErrorCode,
    message: String,
}

impl RemoteError {
    pub fn new(code: RemoteErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code.as_str())
    }
}

impl std::error::Error for RemoteError {}

pub type RemoteResult<T> = Result<T, RemoteError>;

pub fn permission_denied(message: impl Into<String>) -> RemoteError {
    RemoteError::new(RemoteErrorCode::PermissionDenied, message)
}

pub fn unavailable(message: impl Into<String>) -> RemoteError {
    RemoteError::new(RemoteErrorCode::Unavailable, message)
}

pub fn invalid_argument(message: impl Into<String>) -> RemoteError {
    RemoteError::new(RemoteErrorCode::InvalidArgument, message)
}

pub fn internal_error(message: impl Into<String>) -> RemoteError {
    RemoteError::new(RemoteErrorCode::Internal, message)
}

/// One delta observed under a subscribed collection path. Events for the same
/// key arrive in the order the service emitted them; across keys no order is
/// guaranteed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChildEvent {
    Added { key: String, value: Value },
    Changed { key: String, value: Value },
    Removed { key: String },
}

impl ChildEvent {
    pub fn key(&self) -> &str {
        match self {
            ChildEvent::Added { key, .. }
            | ChildEvent::Changed { key, .. }
            | ChildEvent::Removed { key } => key,
        }
    }

    /// The new value carried by the event; `None` for removals.
    pub fn value(&self) -> Option<&Value> {
        match self {
            ChildEvent::Added { value, .. } | ChildEvent::Changed { value, .. } => Some(value),
            ChildEvent::Removed { .. } => None,
        }
    }
}

pub type ChildObserver = Arc<dyn Fn(ChildEvent) + Send + Sync>;

/// Detaches the underlying listener when dropped, or eagerly via
/// [`RemoteSubscription::detach`].
pub struct RemoteSubscription {
    cleanup: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl RemoteSubscription {
    pub fn new<F>(cleanup: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            cleanup: Some(Box::new(cleanup)),
        }
    }

    pub fn detach(mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

impl Drop for RemoteSubscription {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

/// The remote mutable tree-shaped data service.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Binds this connection to the signed-in user's credential. The core
    /// forwards credentials received from the authentication layer; it never
    /// performs the credential exchange itself.
    async fn authenticate(&self, user_id: &str, access_token: &str) -> RemoteResult<()>;

    async fn unauthenticate(&self) -> RemoteResult<()>;

    fn current_user_id(&self) -> Option<String>;

    /// Full set of the value at `path`. Re-applying the same write is a
    /// no-op in effect, which is what makes queue replay idempotent.
    async fn write(&self, path: &str, value: Value) -> RemoteResult<()>;

    /// Partial update of the children named by the map keys.
    async fn update(&self, path: &str, updates: Map<String, Value>) -> RemoteResult<()>;

    async fn read(&self, path: &str) -> RemoteResult<Value>;

    /// Millisecond delta between the service's clock and the local clock.
    async fn server_time_offset(&self) -> RemoteResult<i64>;

    /// Starts delivering add/change/remove events for the children of `path`.
    /// Existing children are reported as `Added` so a fresh listener converges
    /// on the authoritative state.
    fn subscribe_child_events(
        &self,
        path: &str,
        observer: ChildObserver,
    ) -> RemoteResult<RemoteSubscription>;
}

/// Direct children of a tree node, keyed by name. Non-object values have no
/// children.
pub(crate) fn children_map(value: &Value) -> BTreeMap<String, Value> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, child)| (key.clone(), child.clone()))
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// Emits the events that transform `old` children into `new` children.
pub(crate) fn diff_children(old: &Value, new: &Value, observer: &ChildObserver) {
    let old_children = children_map(old);
    let new_children = children_map(new);

    for (key, value) in new_children.iter() {
        match old_children.get(key) {
            None => observer(ChildEvent::Added {
                key: key.clone(),
                value: value.clone(),
            }),
            Some(previous) if previous != value => observer(ChildEvent::Changed {
                key: key.clone(),
                value: value.clone(),
            }),
            Some(_) => {}
        }
    }

    for key in old_children.keys() {
        if !new_children.contains_key(key) {
            observer(ChildEvent::Removed { key: key.clone() });
        }
    }
}
