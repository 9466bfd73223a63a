//! Byte sniffer
//!
//! Classifies a freshly accepted connection as TLS or plaintext by looking at
//! the first bytes the client sent. One byte is enough in the common case: a
//! TLS client always opens with a handshake record (content type 22), and a
//! plaintext HTTP request opens with a method token made of letters.

use std::fmt;
use std::str::FromStr;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::common::{ProxyError, Result};

/// TLS record content type of a handshake record
pub const TLS_HANDSHAKE_RECORD: u8 = 0x16;

/// Outcome of inspecting the peek buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Client is starting a TLS handshake
    Tls,
    /// Client is sending a plaintext request
    Plaintext,
    /// Not enough bytes yet
    Indeterminate,
}

impl Classification {
    /// Whether no more bytes are needed
    #[inline]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Indeterminate)
    }
}

/// What to do with a first byte that matches neither pattern
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SniffPolicy {
    /// Treat it as plaintext and let the request parser reject it
    #[default]
    Lenient,
    /// Close the connection with `MalformedFirstByte`
    Strict,
}

impl<'de> Deserialize<'de> for SniffPolicy {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SniffPolicy::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for SniffPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lenient => write!(f, "lenient"),
            Self::Strict => write!(f, "strict"),
        }
    }
}

impl FromStr for SniffPolicy {
    type Err = ProxyError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            _ => Err(ProxyError::Config(format!(
                "Invalid sniff policy: {}. Valid values are: lenient, strict",
                s
            ))),
        }
    }
}

/// Byte sniffer
///
/// Pure function of the bytes seen so far. The router calls [`Sniffer::classify`]
/// again after every read, always with the whole peek buffer, so a client that
/// trickles its first bytes is handled without losing anything already read.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sniffer {
    policy: SniffPolicy,
}

impl Sniffer {
    /// Create a sniffer with the given malformed-byte policy
    pub fn new(policy: SniffPolicy) -> Self {
        Self { policy }
    }

    /// Classify the bytes buffered so far
    ///
    /// Empty lines (CR/LF) ahead of a request line are tolerated, so a buffer
    /// holding only CR/LF is still indeterminate.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFirstByte` under the strict policy when the first
    /// significant byte can start neither a TLS record nor a request line.
    pub fn classify(&self, buf: &[u8]) -> Result<Classification> {
        let Some(&first) = buf.first() else {
            return Ok(Classification::Indeterminate);
        };

        if first == TLS_HANDSHAKE_RECORD {
            trace!("First byte {:#04x} is a TLS handshake record", first);
            return Ok(Classification::Tls);
        }

        let Some(&significant) = buf.iter().find(|b| !matches!(b, b'\r' | b'\n')) else {
            trace!("Only {} empty-line byte(s) so far", buf.len());
            return Ok(Classification::Indeterminate);
        };

        if significant.is_ascii_alphabetic() {
            return Ok(Classification::Plaintext);
        }

        match self.policy {
            SniffPolicy::Lenient => {
                trace!("Unrecognised first byte {:#04x}, falling back to plaintext", significant);
                Ok(Classification::Plaintext)
            }
            SniffPolicy::Strict => Err(ProxyError::MalformedFirstByte(significant)),
        }
    }
}

/// Record-layer version named by a buffered TLS record header
///
/// Needs the content type plus the two version bytes.
pub fn tls_record_version(buf: &[u8]) -> Option<&'static str> {
    if buf.len() < 3 || buf[0] != TLS_HANDSHAKE_RECORD {
        return None;
    }

    match (buf[1], buf[2]) {
        (0x03, 0x00) => Some("SSLv3"),
        (0x03, 0x01) => Some("TLSv1.0"),
        (0x03, 0x02) => Some("TLSv1.1"),
        (0x03, 0x03) => Some("TLSv1.2"),
        (0x03, 0x04) => Some("TLSv1.3"),
        _ => Some("unknown"),
    }
}
