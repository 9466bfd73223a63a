//! Dual Mode Proxy: TLS ports that also accept plaintext
//!
//! Every port in the port list is plain, TLS-only, or dual-mode
//! (`ssl:allow-plain`). On a dual-mode port the first bytes of each
//! connection are sniffed: a TLS handshake record goes to the TLS pipeline,
//! anything that looks like a request line goes to the plaintext pipeline.
//! The sniffed bytes are replayed, so neither pipeline can tell the
//! connection was inspected. Both pipelines relay to the same origin.
//!
//! # Main Features
//!
//! - ATS-style port list (`8080 8443:ssl:allow-plain 9443:ssl:ip-in=127.0.0.1`)
//! - First-byte protocol sniffing with idle, time and byte budgets
//! - OpenSSL TLS termination with optional client certificates
//! - Per-connection isolation and graceful shutdown
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dual_mode_proxy::{ProxyService, Result};
//! use dual_mode_proxy::config::ProxyConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ProxyConfig {
//!         server_ports: "8443:ssl:allow-plain".to_string(),
//!         target: "127.0.0.1:6000".to_string(),
//!         ..ProxyConfig::default()
//!     };
//!     config.validate()?;
//!
//!     let handle = ProxyService::start(Arc::new(config)).await?;
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod protocol;
pub mod proxy;
pub mod tls;

// Re-export commonly used structures and functions for convenience
pub use common::{parse_socket_addr, ProxyError, Result};
pub use protocol::{PrebufferedStream, SniffPolicy, Sniffer};
pub use proxy::{ProxyHandle, ProxyService};
pub use tls::create_tls_acceptor;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
