//! Error types and results.

use std::{fmt::Debug, io};

use thiserror::Error;

/// Wrapped result type returned by fallible middleman operations.
pub type Result<T> = std::result::Result<T, ErrorKind>;

/// Top-level error for the middleman crates.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// A socket-level operation failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// The proxy configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// A schema or rule document could not be read at all.
    #[error("document error: {0}")]
    Document(String),
    /// Wrapper around a std io error not tied to a transport operation.
    #[error("io error: {0}")]
    IOError(#[from] io::Error),
}

/// Failures surfaced by the UDP transport.
///
/// These map one-to-one onto the return codes a caller of the transport has to
/// distinguish: state errors (`AlreadyListening`, `NotListening`), argument errors
/// (`InvalidPort`, `MessageTooLarge`) and OS-level failures that carry the
/// underlying [`io::Error`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// `listen` was called on a transport that is already listening.
    #[error("transport is already listening")]
    AlreadyListening,
    /// The operation needs a listening socket.
    #[error("transport is not listening")]
    NotListening,
    /// Port zero cannot be listened on.
    #[error("invalid port 0")]
    InvalidPort,
    /// The socket for the given address family could not be opened.
    #[error("invalid address: {0}")]
    InvalidAddress(#[source] io::Error),
    /// Binding the local endpoint failed.
    #[error("bind failed: {0}")]
    BindError(#[source] io::Error),
    /// The reactor thread could not be started.
    #[error("failed to start reactor thread: {0}")]
    ReactorSpawn(#[source] io::Error),
    /// The datagram exceeds the configured maximum send size.
    #[error("message of {size} bytes exceeds the maximum of {max} bytes")]
    MessageTooLarge {
        /// Size of the rejected message.
        size: usize,
        /// Configured maximum.
        max: usize,
    },
    /// The OS rejected the send.
    #[error("send failed: {0}")]
    SendFailure(#[source] io::Error),
}

/// Failures while loading a [`ProxyConfig`](crate::config::ProxyConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path that was looked up.
        path: String,
    },
    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] io::Error),
    /// The configuration is not valid JSON or misses required keys.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    /// The configuration parsed but holds unusable values.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
