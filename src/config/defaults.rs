//! Default configuration values
//!
//! Single source of truth for defaults; the serde attributes on
//! `ProxyConfig` point at these functions.

use std::path::PathBuf;

use super::ClientCertMode;
use crate::protocol::SniffPolicy;

/// Environment variable prefix for all configuration options
///
/// `DUAL_MODE_PROXY_SERVER_PORTS` sets `server_ports`, and so on.
pub const ENV_PREFIX: &str = "DUAL_MODE_PROXY";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default port list: one TLS port that also accepts plaintext
pub const SERVER_PORTS_STR: &str = "8443:ssl:allow-plain";

/// Default origin address as a string
pub const TARGET_STR: &str = "127.0.0.1:6000";

/// Default certificate path as string
pub const CERT_PATH_STR: &str = "certs/server.crt";

/// Default private key path as string
pub const KEY_PATH_STR: &str = "certs/server.key";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Backlog passed to `listen(2)` for every port
pub const LISTEN_BACKLOG: i32 = 1024;

/// How long shutdown waits for in-flight connections, in seconds
pub const SHUTDOWN_GRACE_SECS: u64 = 30;

pub fn server_ports() -> String {
    SERVER_PORTS_STR.to_string()
}

pub fn target() -> String {
    TARGET_STR.to_string()
}

pub fn cert_path() -> PathBuf {
    PathBuf::from(CERT_PATH_STR)
}

pub fn key_path() -> PathBuf {
    PathBuf::from(KEY_PATH_STR)
}

pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

pub fn client_cert_mode() -> ClientCertMode {
    ClientCertMode::None
}

/// Default relay buffer size (8KB)
pub fn buffer_size() -> usize {
    8192
}

/// Origin connect and TLS handshake timeout in seconds
pub fn connection_timeout() -> u64 {
    30
}

/// How long a freshly accepted connection may stay silent, in seconds
pub fn idle_timeout() -> u64 {
    30
}

/// Time allowed between the first byte and a classification, in milliseconds
pub fn classification_timeout_ms() -> u64 {
    500
}

/// Bytes allowed in the peek buffer before a classification is forced
pub fn classification_max_bytes() -> usize {
    8
}

pub fn sniff_policy() -> SniffPolicy {
    SniffPolicy::Lenient
}
