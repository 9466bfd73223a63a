//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::x509::{X509Builder, X509NameBuilder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use dual_mode_proxy::config::ProxyConfig;
use dual_mode_proxy::{ProxyHandle, ProxyService};

/// Response every origin connection gets
pub const ORIGIN_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 2\r\n\r\nok";

/// Write a self-signed P-256 certificate for `localhost` into `dir`
pub fn write_self_signed(dir: &Path) -> (PathBuf, PathBuf) {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", "localhost").unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
    builder.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    let cert = builder.build();

    let cert_path = dir.join("server.crt");
    let key_path = dir.join("server.key");
    std::fs::write(&cert_path, cert.to_pem().unwrap()).unwrap();
    std::fs::write(&key_path, key.private_key_to_pem_pkcs8().unwrap()).unwrap();
    (cert_path, key_path)
}

/// Minimal HTTP origin answering every request with [`ORIGIN_RESPONSE`]
pub async fn spawn_origin() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = stream.write_all(ORIGIN_RESPONSE).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    addr
}

/// Start a proxy for `server_ports` in front of a fresh origin
///
/// The returned directory holds the certificate and must outlive the proxy.
pub async fn start_proxy(server_ports: &str, idle_timeout: u64) -> (ProxyHandle, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let (cert_path, key_path) = write_self_signed(dir.path());

    let config = ProxyConfig {
        server_ports: server_ports.to_string(),
        target: spawn_origin().await,
        cert_path,
        key_path,
        idle_timeout,
        ..ProxyConfig::default()
    };
    config.validate().unwrap();

    let handle = ProxyService::start(Arc::new(config)).await.unwrap();
    (handle, dir)
}

/// HTTP client that trusts the self-signed certificate and ignores proxy settings
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .no_proxy()
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .unwrap()
}
