#![doc = include_str!("RUSTDOC.md")]

pub mod api;
pub mod cache;
pub mod clock;
pub mod constants;
pub mod error;
pub mod logger;
pub mod notify;
pub mod path;
pub mod queue;
pub mod remote;
pub mod server_value;
pub mod store;

#[cfg(test)]
pub mod test_support;

pub use api::{SyncConfig, SyncService, SyncState};
pub use error::{SyncError, SyncErrorCode, SyncResult};
pub use path::Collection;
