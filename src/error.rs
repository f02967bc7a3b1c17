//! Error types for the transfer core.
//!
//! Every failure ends the current connection and nothing else; callers get a
//! single terminal value per transfer.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Dial, accept, read or write failure on the transport.
    #[error("connection error: {0}")]
    Connection(#[source] io::Error),

    /// The stream closed before a declared frame was fully read.
    #[error("short read: stream closed while reading {what} ({expected} bytes expected)")]
    ShortRead { what: &'static str, expected: u64 },

    /// A source file produced fewer bytes than its size at transfer start.
    #[error("incomplete read of {}: {read} of {expected} bytes", path.display())]
    IncompleteRead {
        path: PathBuf,
        read: u64,
        expected: u64,
    },

    /// Create, open, mkdir, read or write failure on the local filesystem.
    #[error("filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Malformed or out-of-range data from the peer.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The caller asked for a transfer that cannot be expressed.
    #[error("invalid transfer request: {0}")]
    InvalidRequest(String),

    /// The send pump stopped accepting frames.
    #[error("send pump closed")]
    PumpClosed,

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl TransferError {
    /// Wrap a filesystem error with the path it happened on.
    pub fn fs(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Classify an error from `read_exact`: EOF means the peer closed early.
    pub(crate) fn from_read(err: io::Error, what: &'static str, expected: u64) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::ShortRead { what, expected }
        } else {
            Self::Connection(err)
        }
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eof_becomes_short_read() {
        let err = TransferError::from_read(io::ErrorKind::UnexpectedEof.into(), "path frame", 12);
        assert!(matches!(
            err,
            TransferError::ShortRead {
                what: "path frame",
                expected: 12
            }
        ));
    }

    #[test]
    fn test_other_read_errors_are_connection_errors() {
        let err = TransferError::from_read(io::ErrorKind::ConnectionReset.into(), "bool frame", 1);
        assert!(matches!(err, TransferError::Connection(_)));
    }

    #[test]
    fn test_filesystem_error_names_path() {
        let err = TransferError::fs("/tmp/x/y.bin", io::ErrorKind::PermissionDenied.into());
        assert!(err.to_string().contains("/tmp/x/y.bin"));
    }
}
