use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::logger::Logger;
use crate::remote::RemoteService;

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("sync/clock"));

/// Millisecond delta between the remote service's clock and the local clock,
/// owned by the authenticated session so it can never leak across
/// sign-in/sign-out cycles.
///
/// Fresh writes prefer the server-timestamp sentinel; the offset exists for
/// timestamps that were composed locally (possibly offline) and must order
/// consistently with the server's clock when replayed.
#[derive(Debug, Default)]
pub struct ClockOffset {
    offset_millis: AtomicI64,
}

impl ClockOffset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset_millis(&self) -> i64 {
        self.offset_millis.load(Ordering::SeqCst)
    }

    /// Applies the tracked delta to a locally measured timestamp.
    pub fn adjust(&self, local_millis: i64) -> i64 {
        local_millis + self.offset_millis()
    }

    /// Fetches the authoritative delta for the current session. A fetch
    /// failure is soft: the previous value (0 before the first success) is
    /// retained and returned, and the failure is only logged.
    pub async fn refresh(&self, remote: &Arc<dyn RemoteService>) -> i64 {
        match remote.server_time_offset().await {
            Ok(offset) => {
                self.offset_millis.store(offset, Ordering::SeqCst);
                LOGGER.debug(format!("Server clock offset refreshed: {offset}ms"));
                offset
            }
            Err(err) => {
                let retained = self.offset_millis();
                LOGGER.warn(format!(
                    "Failed to refresh server clock offset, keeping {retained}ms: {err}"
                ));
                retained
            }
        }
    }
}
