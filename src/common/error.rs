//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use thiserror::Error;
use std::io;

/// Dual-mode proxy error type
#[derive(Error, Debug)]
pub enum ProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// OpenSSL error
    #[error("OpenSSL error: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),

    /// TLS handshake error
    #[error("TLS handshake error: {0}")]
    TlsHandshake(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Certificate error
    #[error("Certificate error: {0}")]
    Certificate(String),

    /// No decision could be made within the classification budget
    #[error("Protocol classification timed out after {waited_ms} ms with {buffered} byte(s) buffered")]
    ClassificationTimeout {
        /// Time spent waiting since the first byte arrived
        waited_ms: u128,
        /// Bytes held in the peek buffer when the budget ran out
        buffered: usize,
    },

    /// First significant byte is neither a TLS record marker nor a request-line start
    #[error("Malformed first byte {0:#04x}: neither TLS handshake nor request line")]
    MalformedFirstByte(u8),

    /// No traffic before the idle timeout expired
    #[error("Connection idle for {waited_ms} ms")]
    IdleTimeout {
        /// Configured idle timeout
        waited_ms: u128,
    },

    /// Peer closed the connection before it could be classified
    #[error("Peer closed the connection before it could be classified")]
    PeerClosed,

    /// Downstream handler rejected the connection
    #[error("{protocol} handler failed: {source}")]
    HandlerDispatch {
        /// Pipeline the connection was dispatched to
        protocol: &'static str,
        /// Error reported by the handler
        #[source]
        source: Box<ProxyError>,
    },

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

impl ProxyError {
    /// Whether the error concerns a single connection only.
    ///
    /// These are logged and the connection is closed; the listener keeps
    /// accepting.
    pub fn is_connection_local(&self) -> bool {
        matches!(
            self,
            Self::ClassificationTimeout { .. }
                | Self::MalformedFirstByte(_)
                | Self::IdleTimeout { .. }
                | Self::PeerClosed
                | Self::HandlerDispatch { .. }
                | Self::TlsHandshake(_)
        )
    }

    /// Short label used for metrics and log lines
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Ssl(_) => "ssl",
            Self::TlsHandshake(_) => "tls_handshake",
            Self::Config(_) => "config",
            Self::Certificate(_) => "certificate",
            Self::ClassificationTimeout { .. } => "classification_timeout",
            Self::MalformedFirstByte(_) => "malformed_first_byte",
            Self::IdleTimeout { .. } => "idle_timeout",
            Self::PeerClosed => "peer_closed",
            Self::HandlerDispatch { .. } => "handler_dispatch",
            Self::Other(_) => "other",
        }
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `ProxyError`.
pub type Result<T> = std::result::Result<T, ProxyError>;
