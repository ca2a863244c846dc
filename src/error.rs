use std::fmt::{Display, Formatter};

use crate::remote::RemoteError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncErrorCode {
    NotAuthenticated,
    RemoteWriteFailed,
    ReplayPartialFailure,
    InvalidArgument,
    Internal,
}

impl SyncErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncErrorCode::NotAuthenticated => "sync/not-authenticated",
            SyncErrorCode::RemoteWriteFailed => "sync/remote-write-failed",
            SyncErrorCode::ReplayPartialFailure => "sync/replay-partial-failure",
            SyncErrorCode::InvalidArgument => "sync/invalid-argument",
            SyncErrorCode::Internal => "sync/internal",
        }
    }
}

#[derive(Clone, Debug)]
pub struct SyncError {
    pub code: SyncErrorCode,
    message: String,
}

impl SyncError {
    pub fn new(code: SyncErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl std::error::Error for SyncError {}

pub type SyncResult<T> = Result<T, SyncError>;

pub fn not_authenticated(message: impl Into<String>) -> SyncError {
    SyncError::new(SyncErrorCode::NotAuthenticated, message)
}

pub fn remote_write_failed(err: RemoteError) -> SyncError {
    SyncError::new(
        SyncErrorCode::RemoteWriteFailed,
        format!("Remote write failed: {err}"),
    )
}

pub fn replay_partial_failure(failed: usize, total: usize) -> SyncError {
    SyncError::new(
        SyncErrorCode::ReplayPartialFailure,
        format!("{failed} of {total} queued updates failed to replay"),
    )
}

pub fn invalid_argument(message: impl Into<String>) -> SyncError {
    SyncError::new(SyncErrorCode::InvalidArgument, message)
}

pub fn internal_error(message: impl Into<String>) -> SyncError {
    SyncError::new(SyncErrorCode::Internal, message)
}
