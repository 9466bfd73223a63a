//! TLS handling module
//!
//! This module builds the OpenSSL acceptor and implements the TLS side of a
//! dual-mode port.

mod acceptor;
pub mod cert;
mod handler;

pub use acceptor::create_tls_acceptor;
pub use cert::{cert_fingerprint, cert_subject, load_cert};
pub use handler::TlsHandler;
