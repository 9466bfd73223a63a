//! Configuration module
//!
//! This module handles application configuration: the JSON/environment
//! loader, validation, and the port list that decides which ports speak TLS
//! and which of those also accept plaintext.

pub mod defaults;
mod loader;
mod ports;
mod validator;

pub use self::defaults::ENV_PREFIX;
pub use self::ports::{parse_server_ports, ListenerConfig, PortDescriptor, SniffSettings};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::common::{ProxyError, Result};
use crate::protocol::SniffPolicy;

/// Client certificate verification mode
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClientCertMode {
    /// Require client certificate, connection fails if not provided
    Required,
    /// Verify the client certificate if provided but don't require it
    Optional,
    /// Don't verify client certificates
    None,
}

// Case-insensitive deserialization
impl<'de> Deserialize<'de> for ClientCertMode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ClientCertMode::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl Default for ClientCertMode {
    #[inline]
    fn default() -> Self {
        defaults::client_cert_mode()
    }
}

impl fmt::Display for ClientCertMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "required"),
            Self::Optional => write!(f, "optional"),
            Self::None => write!(f, "none"),
        }
    }
}

impl FromStr for ClientCertMode {
    type Err = ProxyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "required" => Ok(Self::Required),
            "optional" => Ok(Self::Optional),
            "none" => Ok(Self::None),
            _ => Err(ProxyError::Config(format!(
                "Invalid client certificate mode: {}. Valid values are: required, optional, none",
                s
            ))),
        }
    }
}

/// Proxy configuration
///
/// Every field has a default, so a configuration file only needs the keys it
/// changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[serde(default)]
pub struct ProxyConfig {
    // --- Network settings ---

    /// Port list, e.g. `8080 8443:ssl:allow-plain`
    #[serde(default = "defaults::server_ports")]
    pub server_ports: String,

    /// Origin every classified connection is relayed to (host:port)
    #[serde(default = "defaults::target")]
    pub target: String,

    // --- TLS settings ---

    /// Server certificate (PEM)
    #[serde(default = "defaults::cert_path")]
    pub cert_path: PathBuf,

    /// Server private key (PEM)
    #[serde(default = "defaults::key_path")]
    pub key_path: PathBuf,

    /// CA bundle used to verify client certificates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert_path: Option<PathBuf>,

    /// Client certificate verification mode
    #[serde(default)]
    pub client_cert_mode: ClientCertMode,

    // --- General settings ---

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "defaults::log_level")]
    pub log_level: String,

    /// Relay buffer size in bytes
    #[serde(default = "defaults::buffer_size")]
    pub buffer_size: usize,

    /// Origin connect and TLS handshake timeout in seconds
    #[serde(default = "defaults::connection_timeout")]
    pub connection_timeout: u64,

    // --- Protocol sniffing ---

    /// How long a connection may stay silent, in seconds
    ///
    /// Applies before the first byte and to an established relay.
    #[serde(default = "defaults::idle_timeout")]
    pub idle_timeout: u64,

    /// Time allowed from the first byte to a decision, in milliseconds
    #[serde(default = "defaults::classification_timeout_ms")]
    pub classification_timeout_ms: u64,

    /// Bytes read before a decision is forced
    #[serde(default = "defaults::classification_max_bytes")]
    pub classification_max_bytes: usize,

    /// Handling of a first byte that is neither TLS nor a request line
    #[serde(default = "defaults::sniff_policy")]
    pub sniff_policy: SniffPolicy,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            server_ports: defaults::server_ports(),
            target: defaults::target(),
            cert_path: defaults::cert_path(),
            key_path: defaults::key_path(),
            ca_cert_path: None,
            client_cert_mode: defaults::client_cert_mode(),
            log_level: defaults::log_level(),
            buffer_size: defaults::buffer_size(),
            connection_timeout: defaults::connection_timeout(),
            idle_timeout: defaults::idle_timeout(),
            classification_timeout_ms: defaults::classification_timeout_ms(),
            classification_max_bytes: defaults::classification_max_bytes(),
            sniff_policy: defaults::sniff_policy(),
        }
    }
}

impl ProxyConfig {
    /// Parsed port list
    pub fn ports(&self) -> Result<Vec<PortDescriptor>> {
        parse_server_ports(&self.server_ports)
    }

    /// Whether any port terminates TLS
    pub fn has_tls_ports(&self) -> Result<bool> {
        Ok(self.ports()?.iter().any(|p| p.ssl))
    }

    /// Sniffing limits shared by every port
    pub fn sniff_settings(&self) -> SniffSettings {
        SniffSettings {
            policy: self.sniff_policy,
            idle_timeout: self.idle_timeout(),
            classification_timeout: Duration::from_millis(self.classification_timeout_ms),
            max_bytes: self.classification_max_bytes,
        }
    }

    /// One immutable listener configuration per port
    pub fn listener_configs(&self) -> Result<Vec<ListenerConfig>> {
        let sniff = self.sniff_settings();
        Ok(self
            .ports()?
            .iter()
            .map(|descriptor| ListenerConfig::new(descriptor, sniff))
            .collect())
    }

    /// Origin connect and TLS handshake timeout
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    /// Wait for the first byte, and for traffic on an established relay
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }
}
