//! TLS handshake acceptor
//!
//! Runs the server side of the handshake on the prebuffered stream, so the
//! ClientHello bytes the router already read are fed to OpenSSL first, then
//! relays the decrypted stream to the origin.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use openssl::ssl::{Ssl, SslAcceptor};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_openssl::SslStream;

use crate::common::{ProxyError, Result};
use crate::protocol::PrebufferedStream;
use crate::proxy::{Connection, OriginForwarder, ProtocolHandler};
use super::cert::cert_subject;

/// TLS handshake acceptor
#[derive(Clone)]
pub struct TlsHandler {
    /// `None` when no port terminates TLS
    acceptor: Option<Arc<SslAcceptor>>,
    handshake_timeout: Duration,
    forwarder: Arc<OriginForwarder>,
}

impl TlsHandler {
    pub fn new(acceptor: Arc<SslAcceptor>, handshake_timeout: Duration, forwarder: Arc<OriginForwarder>) -> Self {
        Self {
            acceptor: Some(acceptor),
            handshake_timeout,
            forwarder,
        }
    }

    /// Handler for a service without TLS ports
    ///
    /// Plain-only ports never dispatch to TLS; should it happen anyway the
    /// connection is refused.
    pub fn disabled(forwarder: Arc<OriginForwarder>) -> Self {
        Self {
            acceptor: None,
            handshake_timeout: Duration::ZERO,
            forwarder,
        }
    }
}

impl std::fmt::Debug for TlsHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsHandler")
            .field("acceptor", &self.acceptor.as_ref().map(|_| "<SslAcceptor>"))
            .field("handshake_timeout", &self.handshake_timeout)
            .field("forwarder", &self.forwarder)
            .finish()
    }
}

impl ProtocolHandler for TlsHandler {
    fn protocol(&self) -> &'static str {
        "tls"
    }

    fn handle<S>(&self, conn: Connection<PrebufferedStream<S>>) -> impl Future<Output = Result<()>> + Send
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let acceptor = self.acceptor.clone();
        let handshake_timeout = self.handshake_timeout;
        let forwarder = Arc::clone(&self.forwarder);

        async move {
            let acceptor = acceptor
                .ok_or_else(|| ProxyError::Config("TLS connection on a service without TLS ports".to_string()))?;
            let (id, peer, stream) = conn.into_parts();

            let ssl = Ssl::new(acceptor.context())?;
            let mut stream = SslStream::new(ssl, stream)?;

            match timeout(handshake_timeout, Pin::new(&mut stream).accept()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(ProxyError::TlsHandshake(e.to_string())),
                Err(_) => {
                    return Err(ProxyError::TlsHandshake(format!(
                        "handshake not finished within {:?}",
                        handshake_timeout
                    )));
                }
            }

            debug!(
                "[{}] TLS handshake with {} complete ({}, {})",
                id,
                peer,
                stream.ssl().version_str(),
                stream.ssl().current_cipher().map(|c| c.name()).unwrap_or("no cipher")
            );

            if let Some(cert) = stream.ssl().peer_certificate() {
                info!("[{}] Client certificate subject: {}", id, cert_subject(&cert));
            }

            forwarder.relay(id, stream).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::config::ClientCertMode;
    use crate::tls::cert::tests::write_self_signed;
    use crate::tls::create_tls_acceptor;

    async fn echo_origin() -> String {
        let origin = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = origin.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = origin.accept().await.unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&buf).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_handshake_reads_prebuffered_client_hello() {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = write_self_signed(dir.path());
        let acceptor = create_tls_acceptor(&cert, &key, None, &ClientCertMode::None).unwrap();

        let forwarder = Arc::new(OriginForwarder::new(echo_origin().await, 1024, Duration::from_secs(5), Duration::from_secs(5)));
        let handler = TlsHandler::new(Arc::new(acceptor), Duration::from_secs(5), forwarder);

        let (client_io, mut server_io) = tokio::io::duplex(16 * 1024);

        let client = tokio::spawn(async move {
            let mut connector = SslConnector::builder(SslMethod::tls()).unwrap();
            connector.set_verify(SslVerifyMode::NONE);
            let ssl = connector.build().configure().unwrap().into_ssl("localhost").unwrap();
            let mut tls = SslStream::new(ssl, client_io).unwrap();
            Pin::new(&mut tls).connect().await.unwrap();
            tls.write_all(b"hello").await.unwrap();
            let mut echoed = [0u8; 5];
            tls.read_exact(&mut echoed).await.unwrap();
            echoed
        });

        // Take the first byte off the wire, as the sniffer would
        let mut first = [0u8; 1];
        server_io.read_exact(&mut first).await.unwrap();
        assert_eq!(first[0], 0x16);

        let peer = "127.0.0.1:50000".parse().unwrap();
        let stream = PrebufferedStream::new(bytes::Bytes::copy_from_slice(&first), server_io);
        let serve = tokio::spawn(async move { handler.handle(Connection::new(peer, stream)).await });

        assert_eq!(&client.await.unwrap(), b"hello");
        serve.abort();
    }

    #[tokio::test]
    async fn test_plain_bytes_fail_handshake() {
        let dir = tempfile::tempdir().unwrap();
        let (cert, key) = write_self_signed(dir.path());
        let acceptor = create_tls_acceptor(&cert, &key, None, &ClientCertMode::None).unwrap();
        let forwarder = Arc::new(OriginForwarder::new("127.0.0.1:9", 1024, Duration::from_secs(1), Duration::from_secs(1)));
        let handler = TlsHandler::new(Arc::new(acceptor), Duration::from_secs(5), forwarder);

        let (mut client_io, server_io) = tokio::io::duplex(1024);
        client_io.write_all(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").await.unwrap();

        let peer = "127.0.0.1:50000".parse().unwrap();
        let result = handler.handle(Connection::new(peer, PrebufferedStream::passthrough(server_io))).await;
        assert!(matches!(result, Err(ProxyError::TlsHandshake(_))));
    }

    #[tokio::test]
    async fn test_disabled_handler_refuses() {
        let forwarder = Arc::new(OriginForwarder::new("127.0.0.1:9", 1024, Duration::from_secs(1), Duration::from_secs(1)));
        let handler = TlsHandler::disabled(forwarder);
        let (_client_io, server_io) = tokio::io::duplex(64);

        let peer = "127.0.0.1:50000".parse().unwrap();
        let result = handler.handle(Connection::new(peer, PrebufferedStream::passthrough(server_io))).await;
        assert!(matches!(result, Err(ProxyError::Config(_))));
    }
}
