//! Error types for the registry coordinator.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Classification returned by every store adapter operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    ConnectionFailure,
    ProtocolFailure,
    Timeout,
}

impl std::fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StoreErrorKind::ConnectionFailure => "connection-failure",
            StoreErrorKind::ProtocolFailure => "protocol-failure",
            StoreErrorKind::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("required field missing: {0}")]
    FieldMissing(&'static str),

    #[error("no store configured for group {0}")]
    UnknownGroup(String),

    #[error("failed to decode request: {0}")]
    DecodeRequest(String),

    #[error("failed to encode response: {0}")]
    EncodeResponse(String),

    #[error("store connection pool unavailable for {store}: {reason}")]
    StorePoolUnavailable { store: String, reason: String },

    #[error("store operation failed ({kind}): {reason}")]
    StoreOp { kind: StoreErrorKind, reason: String },

    #[error("lock busy for {group}/{addr}")]
    LockBusy { group: String, addr: String },

    #[error("failed to serialize instance record: {0}")]
    Serialize(String),

    #[error("outbound rpc failed: {0}")]
    OutboundRpc(String),

    #[error("failed to parse semver: {0}")]
    ParseSemver(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        let kind = if err.is_timeout() {
            StoreErrorKind::Timeout
        } else if err.is_io_error() {
            StoreErrorKind::ConnectionFailure
        } else {
            StoreErrorKind::ProtocolFailure
        };
        Error::StoreOp { kind, reason: err.to_string() }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialize(err.to_string())
    }
}

impl From<notify::Error> for Error {
    fn from(err: notify::Error) -> Self {
        Error::Internal(format!("config watcher error: {err}"))
    }
}

impl From<crate::config::watcher::WatcherError> for Error {
    fn from(err: crate::config::watcher::WatcherError) -> Self {
        Error::Internal(format!("config watcher error: {err}"))
    }
}
