//! Configuration validator

use std::path::Path;

use log::warn;

use crate::common::{parse_socket_addr, ProxyError, Result};
use crate::config::{ClientCertMode, ProxyConfig};

/// Smallest accepted relay buffer
const MIN_BUFFER_SIZE: usize = 512;

/// Largest accepted classification byte budget
const MAX_CLASSIFICATION_BYTES: usize = 64;

/// Largest accepted `connection_timeout` and `idle_timeout` (one day)
const MAX_TIMEOUT_SECS: u64 = 86_400;

/// Largest accepted `classification_timeout_ms`
const MAX_CLASSIFICATION_TIMEOUT_MS: u64 = 60_000;

fn check_range(name: &str, value: u64, max: u64, unit: &str) -> Result<()> {
    if value == 0 || value > max {
        return Err(ProxyError::Config(format!(
            "{} must be between 1 and {} {}, got {}",
            name, max, unit, value
        )));
    }
    Ok(())
}

fn check_file_exists(path: &Path, what: &str) -> Result<()> {
    if !path.is_file() {
        return Err(ProxyError::Config(format!("{} not found: {}", what, path.display())));
    }
    Ok(())
}

impl ProxyConfig {
    /// Validate the configuration
    ///
    /// Certificate files are only required when some port terminates TLS.
    pub fn validate(&self) -> Result<()> {
        let ports = self.ports()?;

        parse_socket_addr(&self.target)
            .map_err(|e| ProxyError::Config(format!("Invalid target '{}': {}", self.target, e)))?;

        if self.buffer_size < MIN_BUFFER_SIZE {
            return Err(ProxyError::Config(format!(
                "buffer_size must be at least {} bytes, got {}",
                MIN_BUFFER_SIZE, self.buffer_size
            )));
        }

        check_range("connection_timeout", self.connection_timeout, MAX_TIMEOUT_SECS, "s")?;
        check_range("idle_timeout", self.idle_timeout, MAX_TIMEOUT_SECS, "s")?;
        check_range(
            "classification_timeout_ms",
            self.classification_timeout_ms,
            MAX_CLASSIFICATION_TIMEOUT_MS,
            "ms",
        )?;

        if self.classification_max_bytes == 0 || self.classification_max_bytes > MAX_CLASSIFICATION_BYTES {
            return Err(ProxyError::Config(format!(
                "classification_max_bytes must be between 1 and {}, got {}",
                MAX_CLASSIFICATION_BYTES, self.classification_max_bytes
            )));
        }

        if ports.iter().any(|p| p.ssl) {
            check_file_exists(&self.cert_path, "Certificate file")?;
            check_file_exists(&self.key_path, "Private key file")?;

            match (&self.ca_cert_path, self.client_cert_mode) {
                (Some(ca), _) => check_file_exists(ca, "CA certificate file")?,
                (None, ClientCertMode::None) => {}
                (None, mode) => {
                    return Err(ProxyError::Config(format!(
                        "client_cert_mode '{}' needs ca_cert_path",
                        mode
                    )));
                }
            }
        } else if self.client_cert_mode != ClientCertMode::None {
            warn!("client_cert_mode is set but no port terminates TLS");
        }

        let dual_mode = ports.iter().any(|p| p.allow_plain);
        if dual_mode && self.classification_timeout_ms >= self.idle_timeout.saturating_mul(1000) {
            warn!(
                "classification_timeout_ms ({}) is not shorter than idle_timeout ({} s)",
                self.classification_timeout_ms, self.idle_timeout
            );
        }

        Ok(())
    }
}
