//! Error types
//!
//! Defines the error taxonomy for request handling and for server startup.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while resolving, listing or streaming a request path.
///
/// The string payloads carry virtual paths or diagnostic detail for the logs.
/// They are never sent to the client.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("path escapes server root: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// The requested byte range starts past the end of a file of this length.
    #[error("range not satisfiable for length {0}")]
    RangeNotSatisfiable(u64),
}

impl ServeError {
    /// Classifies an I/O error raised while touching `virtual_path`.
    pub fn from_io(err: io::Error, virtual_path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => {
                ServeError::NotFound(virtual_path.to_string())
            }
            io::ErrorKind::PermissionDenied => {
                ServeError::PermissionDenied(virtual_path.to_string())
            }
            _ => ServeError::Io(err),
        }
    }
}

/// Errors raised after a response head was sent, while copying body bytes.
///
/// Both variants record how many body bytes reached the client first.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Reading the source failed; the response is cut short.
    #[error("read failed mid-stream after {sent} bytes: {source}")]
    Read {
        #[source]
        source: io::Error,
        sent: u64,
    },

    /// Writing to the client failed or stalled past the write timeout.
    #[error("client write failed after {sent} bytes: {source}")]
    Write {
        #[source]
        source: io::Error,
        sent: u64,
    },
}

impl TransferError {
    pub fn sent(&self) -> u64 {
        match self {
            TransferError::Read { sent, .. } | TransferError::Write { sent, .. } => *sent,
        }
    }
}

/// Errors raised while reading a request head off the wire.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request line exceeds {0} bytes")]
    RequestLineTooLong(usize),

    #[error("request header section too large")]
    HeadersTooLarge,

    #[error("unsupported HTTP version {0}")]
    UnsupportedVersion(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors that prevent the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid server root {path}: {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    #[error("invalid bind address {0}")]
    InvalidAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified_by_kind() {
        let err = ServeError::from_io(io::ErrorKind::NotFound.into(), "/a");
        assert!(matches!(err, ServeError::NotFound(p) if p == "/a"));

        let err = ServeError::from_io(io::ErrorKind::PermissionDenied.into(), "/b");
        assert!(matches!(err, ServeError::PermissionDenied(p) if p == "/b"));

        let err = ServeError::from_io(io::ErrorKind::UnexpectedEof.into(), "/c");
        assert!(matches!(err, ServeError::Io(_)));
    }
}
