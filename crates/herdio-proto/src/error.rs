//! Protocol error types

use thiserror::Error;

/// Errors produced while encoding or decoding protocol messages
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Inode object payload has the wrong length
    #[error("inode object has wrong length: expected {expected} bytes, got {actual}")]
    InodeLength { expected: usize, actual: usize },

    /// Image name exceeds the fixed field width
    #[error("image name is {len} bytes, limit is {max}")]
    NameTooLong { len: usize, max: usize },

    /// Snapshot tag exceeds the fixed field width
    #[error("snapshot tag is {len} bytes, limit is {max}")]
    TagTooLong { len: usize, max: usize },
}
