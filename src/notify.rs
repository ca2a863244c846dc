//! User-facing notification hook.
//!
//! When a queued write settles with a failure the service tells the user the
//! change was not saved and will be retried on their next visit. How that
//! message is surfaced belongs to the embedding application, so the service
//! only holds a sink.

use once_cell::sync::Lazy;

use crate::logger::Logger;

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("sync/notify"));

/// Fire-and-forget delivery of a short human-readable message. Implementations
/// must not block and must not fail loudly.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, message: &str);
}

/// Default sink: the message only reaches the log.
pub struct LoggerSink;

impl NotificationSink for LoggerSink {
    fn notify(&self, message: &str) {
        LOGGER.info(message);
    }
}
