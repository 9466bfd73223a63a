//! Port list parsing
//!
//! Ports are described as `<port>[:ssl][:allow-plain][:ip-in=<addr>]`, several
//! descriptors separated by whitespace or commas, e.g.
//! `8080 8443:ssl:allow-plain`.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use crate::common::{ProxyError, Result};
use crate::protocol::SniffPolicy;

/// One entry of the port list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortDescriptor {
    /// Port number (0 asks the OS for one)
    pub port: u16,
    /// Address to bind; all IPv4 interfaces when unset
    pub ip: Option<IpAddr>,
    /// Terminate TLS on this port
    pub ssl: bool,
    /// Also accept plaintext on a TLS port
    pub allow_plain: bool,
}

impl PortDescriptor {
    /// Socket address the port binds to
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)), self.port)
    }
}

impl FromStr for PortDescriptor {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = split_fields(s).into_iter();
        let port_str = parts.next().unwrap_or_default();
        let port = port_str.parse::<u16>().map_err(|_| {
            ProxyError::Config(format!("Invalid port number '{}' in port descriptor '{}'", port_str, s))
        })?;

        let mut descriptor = Self { port, ip: None, ssl: false, allow_plain: false };

        for option in parts {
            let lower = option.to_ascii_lowercase();
            if lower == "ssl" {
                descriptor.ssl = true;
            } else if lower == "allow-plain" {
                descriptor.allow_plain = true;
            } else if let Some(addr) = lower.strip_prefix("ip-in=") {
                let ip = addr.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>().map_err(|_| {
                    ProxyError::Config(format!("Invalid ip-in address '{}' in port descriptor '{}'", addr, s))
                })?;
                descriptor.ip = Some(ip);
            } else {
                return Err(ProxyError::Config(format!(
                    "Unknown option '{}' in port descriptor '{}'",
                    option, s
                )));
            }
        }

        if descriptor.allow_plain && !descriptor.ssl {
            return Err(ProxyError::Config(format!(
                "Port descriptor '{}': allow-plain is only valid on an ssl port",
                s
            )));
        }

        Ok(descriptor)
    }
}

impl fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.port)?;
        if self.ssl {
            write!(f, ":ssl")?;
        }
        if self.allow_plain {
            write!(f, ":allow-plain")?;
        }
        match self.ip {
            Some(IpAddr::V6(ip)) => write!(f, ":ip-in=[{}]", ip)?,
            Some(ip) => write!(f, ":ip-in={}", ip)?,
            None => {}
        }
        Ok(())
    }
}

/// Split on ':' outside of `[...]`, so IPv6 addresses stay whole
fn split_fields(s: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut start = 0;
    let mut in_brackets = false;

    for (i, c) in s.char_indices() {
        match c {
            '[' => in_brackets = true,
            ']' => in_brackets = false,
            ':' if !in_brackets => {
                fields.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(&s[start..]);
    fields
}

/// Parse a whole port list
///
/// # Errors
///
/// Fails on an empty list, any malformed descriptor, or the same address
/// listed twice (port 0 may repeat).
pub fn parse_server_ports(list: &str) -> Result<Vec<PortDescriptor>> {
    let descriptors = list
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(PortDescriptor::from_str)
        .collect::<Result<Vec<_>>>()?;

    if descriptors.is_empty() {
        return Err(ProxyError::Config("server_ports does not list any port".to_string()));
    }

    for (i, a) in descriptors.iter().enumerate() {
        if a.port != 0 && descriptors[..i].iter().any(|b| b.bind_addr() == a.bind_addr()) {
            return Err(ProxyError::Config(format!("Port {} is listed more than once", a.port)));
        }
    }

    Ok(descriptors)
}

/// Sniffing limits applied to every connection on a port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SniffSettings {
    /// What to do with an unrecognised first byte
    pub policy: SniffPolicy,
    /// Longest wait for the first byte
    pub idle_timeout: Duration,
    /// Longest wait between the first byte and a decision
    pub classification_timeout: Duration,
    /// Most bytes read before a decision is forced
    pub max_bytes: usize,
}

/// Immutable per-listener configuration
///
/// Built once at startup and shared by every connection task of the port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Address to bind
    pub addr: SocketAddr,
    /// Terminate TLS on this port
    pub tls: bool,
    /// Sniff and accept plaintext too (only meaningful with `tls`)
    pub allow_plain: bool,
    /// Sniffing limits
    pub sniff: SniffSettings,
}

impl ListenerConfig {
    /// Build from a port descriptor
    pub fn new(descriptor: &PortDescriptor, sniff: SniffSettings) -> Self {
        Self {
            addr: descriptor.bind_addr(),
            tls: descriptor.ssl,
            allow_plain: descriptor.ssl && descriptor.allow_plain,
            sniff,
        }
    }

    /// Whether connections on this port are sniffed
    pub fn sniffs(&self) -> bool {
        self.tls && self.allow_plain
    }
}
