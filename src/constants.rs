/// Durable-store namespace holding queued-but-unacknowledged remote writes.
pub const QUEUE_NAMESPACE: &str = "queued-updates";

/// Durable-store namespace mirroring values received from live listeners.
pub const CACHE_NAMESPACE: &str = "cached-reads";
