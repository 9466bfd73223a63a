//! End-to-end tests for dual-mode ports
//!
//! Each test runs the full service in front of a small HTTP origin.

mod common;

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use common::{http_client, start_proxy, ORIGIN_RESPONSE};

#[tokio::test]
async fn test_https_on_dual_mode_port() {
    let (handle, _certs) = start_proxy("0:ssl:allow-plain", 30).await;
    let port = handle.local_addrs()[0].port();

    let response = http_client()
        .get(format!("https://127.0.0.1:{}/", port))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_plain_http_on_dual_mode_port() {
    let (handle, _certs) = start_proxy("0:ssl:allow-plain", 30).await;
    let port = handle.local_addrs()[0].port();

    let response = http_client()
        .get(format!("http://127.0.0.1:{}/", port))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_both_protocols_share_one_port() {
    let (handle, _certs) = start_proxy("0:ssl:allow-plain", 30).await;
    let port = handle.local_addrs()[0].port();
    let client = http_client();

    for _ in 0..3 {
        let https = client.get(format!("https://127.0.0.1:{}/", port)).send().await.unwrap();
        assert_eq!(https.status(), 200);
        let http = client.get(format!("http://127.0.0.1:{}/", port)).send().await.unwrap();
        assert_eq!(http.status(), 200);
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_plain_http_on_tls_only_port_fails() {
    let (handle, _certs) = start_proxy("0:ssl:ip-in=127.0.0.1", 30).await;
    let addr = handle.local_addrs()[0];
    assert_eq!(addr.ip().to_string(), "127.0.0.1");

    let result = http_client()
        .get(format!("http://127.0.0.1:{}/", addr.port()))
        .send()
        .await;
    assert!(result.is_err(), "plaintext must not reach the origin on a TLS-only port");

    // TLS still works on the same port
    let response = http_client()
        .get(format!("https://127.0.0.1:{}/", addr.port()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_plain_port_relays_raw_request() {
    let (handle, _certs) = start_proxy("0 0:ssl", 30).await;
    let plain = handle.local_addrs()[0];

    let mut stream = TcpStream::connect(plain).await.unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n").await.unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response, ORIGIN_RESPONSE);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_silent_client_is_closed_after_idle_timeout() {
    let (handle, _certs) = start_proxy("0:ssl:allow-plain", 1).await;
    let addr = handle.local_addrs()[0];

    let mut silent = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(5), silent.read(&mut buf))
        .await
        .expect("idle connection was not closed");
    assert_eq!(read.unwrap_or(0), 0);

    // The port keeps serving
    let response = http_client()
        .get(format!("http://127.0.0.1:{}/", addr.port()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_silent_client_on_plain_port_is_closed_after_idle_timeout() {
    let (handle, _certs) = start_proxy("0", 1).await;
    let addr = handle.local_addrs()[0];

    let mut silent = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(4), silent.read(&mut buf))
        .await
        .expect("silent client on a plain port was not closed");
    assert_eq!(read.unwrap_or(0), 0);

    let response = http_client()
        .get(format!("http://127.0.0.1:{}/", addr.port()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_client_stalling_mid_request_is_closed() {
    let (handle, _certs) = start_proxy("0:ssl:allow-plain", 1).await;
    let addr = handle.local_addrs()[0];

    // Classified as plaintext, then nothing more arrives
    let mut stalled = TcpStream::connect(addr).await.unwrap();
    stalled.write_all(b"G").await.unwrap();

    let mut response = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(4), stalled.read_to_end(&mut response))
        .await
        .expect("stalled client was not closed");
    assert!(read.is_err() || response.is_empty());

    handle.shutdown().await.unwrap();
}
