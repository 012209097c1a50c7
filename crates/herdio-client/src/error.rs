//! Client error types

use std::time::Duration;

use herdio_proto::{ObjectId, ProtoError, ResultCode};
use thiserror::Error;

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client error
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket-level I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the connection mid-exchange
    #[error("connection closed by peer ({remaining} bytes left)")]
    ConnectionClosed { remaining: usize },

    /// The configured request deadline elapsed
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The cluster answered with a non-success result code
    #[error("server error: {0}")]
    Server(ResultCode),

    /// An object operation failed; carries the object ids for diagnostics
    #[error("object operation failed: {code} (oid: {oid}, cow oid: {cow_oid})")]
    Object {
        code: ResultCode,
        oid: ObjectId,
        cow_oid: ObjectId,
    },

    /// Transfer range exceeds the image size
    #[error("offset {offset} + length {length} exceeds image size {size}")]
    OutOfBounds { offset: u64, length: u64, size: u64 },

    /// Write or discard attempted on a snapshot session
    #[error("session is read-only")]
    ReadOnlySession,

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Message encoding failure
    #[error(transparent)]
    Proto(#[from] ProtoError),
}
