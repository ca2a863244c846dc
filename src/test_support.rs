//! Shared helpers for the crate's unit tests.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::cache::DeltaCallback;
use crate::notify::NotificationSink;
use crate::remote::{ChildEvent, ChildObserver};

/// Delta callback that appends every `(key, value)` pair it receives.
pub fn recording_delta() -> (DeltaCallback, Arc<Mutex<Vec<(String, Option<Value>)>>>) {
    let seen: Arc<Mutex<Vec<(String, Option<Value>)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let callback: DeltaCallback = Arc::new(move |key, value| {
        sink.lock().unwrap().push((key.to_string(), value.cloned()));
    });
    (callback, seen)
}

/// Child-event observer that collects every event it receives.
pub fn collecting_observer() -> (ChildObserver, Arc<Mutex<Vec<ChildEvent>>>) {
    let events: Arc<Mutex<Vec<ChildEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let observer: ChildObserver = Arc::new(move |event| {
        sink.lock().unwrap().push(event);
    });
    (observer, events)
}

/// Notification sink that captures messages for assertions.
pub struct RecordingSink {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            messages: Mutex::new(Vec::new()),
        })
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// A directory path unique to this process and call site, for `FileStore`
/// tests that simulate restarts.
pub fn unique_root(label: &str) -> PathBuf {
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    std::env::temp_dir().join(format!(
        "companion-sync-{label}-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    ))
}
