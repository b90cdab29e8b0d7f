//! Error types for fwflash-core
//!
//! Every backend converts its own errors into [`Error`] at the crate
//! boundary. Callers that need to branch on failure class use
//! [`Error::kind`], which sees through any operation context that was
//! attached on the way up.

use std::time::Duration;

use thiserror::Error;

/// Broad failure class of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad checksum, malformed reply, unexpected ordering, verify mismatch
    Protocol,
    /// Transfer, ioctl or handle-claim failure
    Transport,
    /// A bounded wait expired
    Timeout,
    /// Identity mismatch, missing configuration, unsupported input
    NotSupported,
    /// An invariant was violated
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Protocol => "protocol",
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::NotSupported => "not supported",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unexpected data from the device
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Integrity check over a received frame failed
    #[error("checksum mismatch: expected 0x{expected:08X}, calculated 0x{actual:08X}")]
    Checksum { expected: u32, actual: u32 },

    /// Read-back did not match what was written
    #[error("verify failed at 0x{address:06X}: expected 0x{expected:02X}, read 0x{actual:02X}")]
    VerifyMismatch { address: u32, expected: u8, actual: u8 },

    /// Underlying transport failure
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The transport accepted fewer bytes than requested without reporting an error
    #[error("short write: expected {expected} bytes, transferred {actual}")]
    ShortWrite { expected: usize, actual: usize },

    /// A bounded wait expired
    #[error("timed out: {0}")]
    Timeout(String),

    /// A register poll did not reach the expected value before its deadline
    #[error(
        "timed out after {elapsed:?} waiting for register 0x{register:02X} \
         (mask 0x{mask:02X}, expected 0x{expected:02X}, last 0x{last:02X})"
    )]
    RegisterTimeout {
        register: u8,
        mask: u8,
        expected: u8,
        last: u8,
        elapsed: Duration,
    },

    /// The operation or input is not handled
    #[error("not supported: {0}")]
    NotSupported(String),

    /// Invariant violated
    #[error("internal error: {0}")]
    Internal(String),

    /// Wraps an error with the name of the operation that failed
    #[error("{operation} failed: {source}")]
    Context {
        operation: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Transport error without an underlying I/O error
    pub fn transport(message: impl Into<String>) -> Self {
        Error::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Transport error caused by an I/O error
    pub fn transport_io(message: impl Into<String>, source: std::io::Error) -> Self {
        Error::Transport {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Failure class, looking through any [`Error::Context`] wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Protocol(_) | Error::Checksum { .. } | Error::VerifyMismatch { .. } => {
                ErrorKind::Protocol
            }
            Error::Transport { .. } => ErrorKind::Transport,
            Error::ShortWrite { .. } | Error::Internal(_) => ErrorKind::Internal,
            Error::Timeout(_) | Error::RegisterTimeout { .. } => ErrorKind::Timeout,
            Error::NotSupported(_) => ErrorKind::NotSupported,
            Error::Context { source, .. } => source.kind(),
        }
    }

    /// The innermost error, with all context stripped
    pub fn root(&self) -> &Error {
        match self {
            Error::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_supported(&self) -> bool {
        self.kind() == ErrorKind::NotSupported
    }
}

/// Result type alias using the core Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Attach the failing operation's name to an error
pub trait ResultExt<T> {
    fn context(self, operation: impl Into<String>) -> Result<T>;

    /// Like [`ResultExt::context`], building the name only on error
    fn with_context<F: FnOnce() -> String>(self, operation: F) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, operation: impl Into<String>) -> Result<T> {
        self.map_err(|source| Error::Context {
            operation: operation.into(),
            source: Box::new(source),
        })
    }

    fn with_context<F: FnOnce() -> String>(self, operation: F) -> Result<T> {
        self.map_err(|source| Error::Context {
            operation: operation(),
            source: Box::new(source),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_through_context() {
        let err: Result<()> = Err(Error::RegisterTimeout {
            register: 0x93,
            mask: 0x01,
            expected: 0,
            last: 1,
            elapsed: Duration::from_secs(10),
        });
        let err = err.context("erase block").context("write firmware").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(matches!(err.root(), Error::RegisterTimeout { register: 0x93, .. }));
        assert_eq!(
            err.to_string().split(':').next(),
            Some("write firmware failed")
        );
    }

    #[test]
    fn test_short_write_is_internal() {
        let err = Error::ShortWrite {
            expected: 12,
            actual: 8,
        };
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_transport_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone");
        let err = Error::transport_io("bulk out", io);
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.source().is_some());
        assert!(Error::transport("claim").source().is_none());
    }
}
