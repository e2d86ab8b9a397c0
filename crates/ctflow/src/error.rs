//! Error types for conntrack netlink operations.

use std::io;

/// Result type for conntrack netlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the kernel or decoding records.
///
/// The three `Truncated*` variants are record-local decode failures: the
/// buffer ended before a declared attribute did. They abort the affected
/// record only; callers decoding a batch skip the record and continue.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Kernel returned an error code in an ACK message.
    #[error("kernel error: {message} (errno {errno})")]
    Kernel {
        /// The errno value from the kernel.
        errno: i32,
        /// Human-readable error message.
        message: String,
    },

    /// Fewer than 4 bytes remained where an attribute header was expected.
    #[error("truncated attribute header: {remaining} bytes remaining")]
    TruncatedHeader {
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// An attribute declared more payload than the buffer holds.
    #[error("truncated attribute payload: declared {expected} bytes, {remaining} remaining")]
    TruncatedPayload {
        /// Declared payload length.
        expected: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A skip ran past the end of the buffer.
    #[error("truncated skip: requested {requested} bytes, {remaining} remaining")]
    TruncatedSkip {
        /// Requested skip length.
        requested: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// Malformed netlink message stream.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl Error {
    /// Create a kernel error from a negative errno value.
    pub fn from_errno(errno: i32) -> Self {
        let message = io::Error::from_raw_os_error(-errno).to_string();
        Self::Kernel {
            errno: -errno,
            message,
        }
    }

    /// Check if this is a permission error (EPERM, EACCES).
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::Kernel { errno, .. } if matches!(*errno, 1 | 13))
    }

    /// Check if this is a record-local decode failure.
    pub fn is_truncation(&self) -> bool {
        matches!(
            self,
            Self::TruncatedHeader { .. }
                | Self::TruncatedPayload { .. }
                | Self::TruncatedSkip { .. }
        )
    }

    /// Get the errno value if this is a kernel error.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::Kernel { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}
