//! Certificate helpers
//!
//! Used for startup logging of the served certificate and for naming client
//! certificates in connection logs.

use std::path::Path;

use openssl::hash::MessageDigest;
use openssl::x509::{X509NameRef, X509Ref, X509};

use crate::common::{ProxyError, Result};

/// Load the first certificate of a PEM file
pub fn load_cert(cert_path: &Path) -> Result<X509> {
    let pem = std::fs::read(cert_path).map_err(|e| {
        ProxyError::Certificate(format!("Failed to read {}: {}", cert_path.display(), e))
    })?;

    X509::from_pem(&pem).map_err(|e| {
        ProxyError::Certificate(format!("Failed to parse {}: {}", cert_path.display(), e))
    })
}

/// Render an X.509 name as `CN=..., O=...`
pub fn format_name(name: &X509NameRef) -> String {
    name.entries()
        .map(|entry| {
            let key = entry.object().nid().short_name().unwrap_or("?");
            let value = entry
                .data()
                .as_utf8()
                .map(|s| s.to_string())
                .unwrap_or_else(|_| "<binary>".to_string());
            format!("{}={}", key, value)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Subject of a certificate
pub fn cert_subject(cert: &X509Ref) -> String {
    format_name(cert.subject_name())
}

/// SHA-256 fingerprint as colon-separated hex
pub fn cert_fingerprint(cert: &X509Ref) -> Result<String> {
    let digest = cert.digest(MessageDigest::sha256())?;
    Ok(digest
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(":"))
}
