//! Protocol detection module
//!
//! This module decides whether a connection on a dual-mode port speaks TLS or
//! plaintext, and provides the stream that replays the inspected bytes to
//! whichever pipeline takes the connection.

mod prebuffered;
mod sniffer;

pub use prebuffered::PrebufferedStream;
pub use sniffer::{tls_record_version, Classification, SniffPolicy, Sniffer, TLS_HANDSHAKE_RECORD};
