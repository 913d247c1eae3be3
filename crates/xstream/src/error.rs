// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stream errors.
//!
//! Every variant except [`Error::Io`] is one of the boundary codes shared by
//! streams, converters and cancellation. `WouldBlock`, `PartialInput` and
//! `NoSpace` are control-flow signals rather than failures.

use std::fmt;
use std::io;

/// Stream, converter or cancellation error.
#[derive(Debug)]
pub enum Error {
    /// Argument out of range.
    InvalidArgument(String),
    /// Operation not supported by this stream.
    NotSupported(String),
    /// Another operation is in progress on the stream.
    Pending,
    /// Stream is closed.
    Closed,
    /// Operation was cancelled.
    Cancelled,
    /// Non-blocking operation would block.
    WouldBlock,
    /// Converter needs more input.
    PartialInput,
    /// Converter needs more output space.
    NoSpace,
    /// Malformed input data.
    InvalidData(String),
    /// Resource not found.
    NotFound(String),
    /// Out of file descriptors.
    TooManyOpenFiles,
    /// Access denied.
    PermissionDenied(String),
    /// Generic failure.
    Failed(String),
    /// Underlying I/O error without a more specific code.
    Io(io::Error),
}

impl Error {
    #[must_use]
    pub fn is_would_block(&self) -> bool {
        matches!(self, Error::WouldBlock)
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// `PartialInput` or `NoSpace`: the converter asks for a retry with
    /// different buffers.
    #[must_use]
    pub fn is_buffer_request(&self) -> bool {
        matches!(self, Error::PartialInput | Error::NoSpace)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::NotSupported(msg) => write!(f, "operation not supported: {msg}"),
            Self::Pending => write!(f, "stream has outstanding operation"),
            Self::Closed => write!(f, "stream is already closed"),
            Self::Cancelled => write!(f, "operation was cancelled"),
            Self::WouldBlock => write!(f, "operation would block"),
            Self::PartialInput => write!(f, "need more input"),
            Self::NoSpace => write!(f, "not enough space in destination"),
            Self::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::TooManyOpenFiles => write!(f, "too many open files"),
            Self::PermissionDenied(msg) => write!(f, "permission denied: {msg}"),
            Self::Failed(msg) => write!(f, "{msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock => Error::WouldBlock,
            io::ErrorKind::NotFound => Error::NotFound(e.to_string()),
            io::ErrorKind::PermissionDenied => Error::PermissionDenied(e.to_string()),
            io::ErrorKind::InvalidData => Error::InvalidData(e.to_string()),
            io::ErrorKind::InvalidInput => Error::InvalidArgument(e.to_string()),
            io::ErrorKind::Unsupported => Error::NotSupported(e.to_string()),
            _ if e.raw_os_error() == Some(EMFILE) => Error::TooManyOpenFiles,
            _ => Error::Io(e),
        }
    }
}

/// `EMFILE` on every platform that reports it.
const EMFILE: i32 = 24;

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        let kind = match &e {
            Error::Io(_) => {
                if let Error::Io(inner) = e {
                    return inner;
                }
                io::ErrorKind::Other
            }
            Error::WouldBlock => io::ErrorKind::WouldBlock,
            Error::NotFound(_) => io::ErrorKind::NotFound,
            Error::PermissionDenied(_) => io::ErrorKind::PermissionDenied,
            Error::InvalidData(_) => io::ErrorKind::InvalidData,
            Error::InvalidArgument(_) => io::ErrorKind::InvalidInput,
            Error::NotSupported(_) => io::ErrorKind::Unsupported,
            Error::Cancelled => io::ErrorKind::Interrupted,
            Error::PartialInput => io::ErrorKind::UnexpectedEof,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a whole-buffer read. `bytes_read` bytes were copied into the
/// destination before `error` stopped the read.
#[derive(Debug)]
pub struct PartialRead {
    pub bytes_read: usize,
    pub error: Error,
}

impl From<Error> for PartialRead {
    fn from(error: Error) -> Self {
        Self {
            bytes_read: 0,
            error,
        }
    }
}

impl fmt::Display for PartialRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (after {} bytes)", self.error, self.bytes_read)
    }
}

impl std::error::Error for PartialRead {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_kinds_map_to_codes() {
        let e: Error = io::Error::from(io::ErrorKind::WouldBlock).into();
        assert!(e.is_would_block());
        let e: Error = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(e, Error::NotFound(_)));
        let e: Error = io::Error::from_raw_os_error(EMFILE).into();
        assert!(matches!(e, Error::TooManyOpenFiles | Error::Io(_)));
        let e: Error = io::Error::new(io::ErrorKind::Other, "odd").into();
        assert!(matches!(e, Error::Io(_)));
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn test_back_to_io() {
        let e: io::Error = Error::Cancelled.into();
        assert_eq!(e.kind(), io::ErrorKind::Interrupted);
        let e: io::Error = Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe")).into();
        assert_eq!(e.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_partial_read_display() {
        let p = PartialRead {
            bytes_read: 5,
            error: Error::Cancelled,
        };
        assert_eq!(p.to_string(), "operation was cancelled (after 5 bytes)");
    }
}
