//! Proxy service
//!
//! Wires the configured ports to one shared router and runs a
//! [`DualModeListener`] per port. The returned [`ProxyHandle`] controls the
//! running service.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{error, info};
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::common::{parse_socket_addr, ProxyError, Result};
use crate::config::ProxyConfig;
use crate::tls::{create_tls_acceptor, TlsHandler};
use super::forwarder::OriginForwarder;
use super::handler::PlainHandler;
use super::listener::DualModeListener;
use super::router::Router;

/// Router type used by the service
pub type ServiceRouter = Router<TlsHandler, PlainHandler>;

/// Proxy service builder
pub struct ProxyService;

impl ProxyService {
    /// Bind every configured port and start accepting
    ///
    /// All ports are bound before any of them accepts, so a port conflict
    /// fails the whole start.
    ///
    /// # Parameters
    ///
    /// * `config` - Validated proxy configuration
    ///
    /// # Returns
    ///
    /// Returns a handle to the running service
    pub async fn start(config: Arc<ProxyConfig>) -> Result<ProxyHandle> {
        let router = Arc::new(Self::build_router(&config)?);

        let mut listeners = Vec::new();
        for listener_config in config.listener_configs()? {
            listeners.push(DualModeListener::bind(listener_config, Arc::clone(&router))?);
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut local_addrs = Vec::with_capacity(listeners.len());
        let mut tasks = JoinSet::new();

        for listener in listeners {
            local_addrs.push(listener.local_addr());
            tasks.spawn(listener.run(shutdown_rx.clone()));
        }

        info!(
            "Proxy service started on {} port(s), forwarding to {}",
            local_addrs.len(),
            config.target
        );

        Ok(ProxyHandle {
            shutdown,
            local_addrs,
            listeners: tasks,
        })
    }

    /// Build the router shared by every port
    ///
    /// The TLS acceptor is only created when some port terminates TLS, so a
    /// plain-only service needs no certificate.
    pub fn build_router(config: &ProxyConfig) -> Result<ServiceRouter> {
        parse_socket_addr(&config.target)?;

        let forwarder = Arc::new(OriginForwarder::new(
            config.target.clone(),
            config.buffer_size,
            config.connection_timeout(),
            config.idle_timeout(),
        ));

        let tls = if config.has_tls_ports()? {
            let acceptor = create_tls_acceptor(
                &config.cert_path,
                &config.key_path,
                config.ca_cert_path.as_deref(),
                &config.client_cert_mode,
            )?;
            TlsHandler::new(Arc::new(acceptor), config.connection_timeout(), Arc::clone(&forwarder))
        } else {
            TlsHandler::disabled(Arc::clone(&forwarder))
        };

        Ok(Router::new(tls, PlainHandler::new(forwarder)))
    }
}

/// Handle to a running proxy service
#[derive(Debug)]
pub struct ProxyHandle {
    shutdown: watch::Sender<bool>,
    local_addrs: Vec<SocketAddr>,
    listeners: JoinSet<Result<()>>,
}

impl ProxyHandle {
    /// Bound addresses, in port list order
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Wait until one of the listeners stops
    ///
    /// Returns `Ok(())` once every listener has stopped cleanly.
    pub async fn wait(&mut self) -> Result<()> {
        match self.listeners.join_next().await {
            Some(Ok(result)) => result,
            Some(Err(e)) => Err(ProxyError::Other(format!("Listener task failed: {}", e))),
            None => Ok(()),
        }
    }

    /// Stop accepting on every port and drain in-flight connections
    pub async fn shutdown(mut self) -> Result<()> {
        info!("Shutting down proxy service");
        // Listeners that already stopped dropped their receiver
        let _ = self.shutdown.send(true);

        let mut first_error = None;
        while let Some(joined) = self.listeners.join_next().await {
            let result = joined.map_err(|e| ProxyError::Other(format!("Listener task failed: {}", e)));
            if let Err(e) = result.and_then(|r| r) {
                error!("Listener stopped with error: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    #[tokio::test]
    async fn test_plain_only_service_needs_no_certificate() {
        let origin = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = origin.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut stream, _) = origin.accept().await.unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(b"pong").await.unwrap();
        });

        let config = ProxyConfig {
            server_ports: "0".to_string(),
            target,
            cert_path: "does/not/exist.crt".into(),
            key_path: "does/not/exist.key".into(),
            ..ProxyConfig::default()
        };

        let handle = ProxyService::start(Arc::new(config)).await.unwrap();
        assert_eq!(handle.local_addrs().len(), 1);

        let mut client = TcpStream::connect(handle.local_addrs()[0]).await.unwrap();
        client.write_all(b"ping").await.unwrap();
        let mut reply = [0u8; 4];
        tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut reply))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&reply, b"pong");

        drop(client);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_certificate_fails_start() {
        let config = ProxyConfig {
            server_ports: "0:ssl".to_string(),
            cert_path: "does/not/exist.crt".into(),
            key_path: "does/not/exist.key".into(),
            ..ProxyConfig::default()
        };

        assert!(ProxyService::start(Arc::new(config)).await.is_err());
    }
}
