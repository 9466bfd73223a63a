//! Port listener
//!
//! Accepts connections on one configured port and routes each in its own
//! task. A misbehaving connection only ever ends its own task.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::common::{ProxyError, Result};
use crate::config::defaults::{LISTEN_BACKLOG, SHUTDOWN_GRACE_SECS};
use crate::config::ListenerConfig;
use super::connection::Connection;
use super::handler::ProtocolHandler;
use super::router::Router;

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Listener for one port of the port list
pub struct DualModeListener<T, P> {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: Arc<ListenerConfig>,
    router: Arc<Router<T, P>>,
}

impl<T, P> DualModeListener<T, P>
where
    T: ProtocolHandler,
    P: ProtocolHandler,
{
    /// Bind the port described by `config`
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(config: ListenerConfig, router: Arc<Router<T, P>>) -> Result<Self> {
        let addr = config.addr;
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        if addr.is_ipv6() {
            socket.set_only_v6(true)?;
        }
        socket.set_nonblocking(true)?;
        socket
            .bind(&addr.into())
            .map_err(|e| ProxyError::Config(format!("Failed to bind {}: {}", addr, e)))?;
        socket.listen(LISTEN_BACKLOG)?;

        let listener = TcpListener::from_std(socket.into())?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            config: Arc::new(config),
            router,
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept until `shutdown` flips to `true`
    ///
    /// In-flight connections get a grace period before they are aborted.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mode = match (self.config.tls, self.config.allow_plain) {
            (true, true) => "tls+plain",
            (true, false) => "tls",
            (false, _) => "plain",
        };
        info!("Listening on {} ({})", self.local_addr, mode);

        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!("Failed to set TCP_NODELAY for {}: {}", peer, e);
                        }

                        let conn = Connection::new(peer, stream);
                        info!("[{}] Accepted connection from {} on {}", conn.id(), peer, self.local_addr);

                        let router = Arc::clone(&self.router);
                        let config = Arc::clone(&self.config);
                        tasks.spawn(async move {
                            let id = conn.id();
                            match router.route(conn, &config).await {
                                Ok(dispatched) => debug!("[{}] {} connection finished", id, dispatched),
                                Err(e) if e.is_connection_local() => debug!("[{}] Connection closed: {}", id, e),
                                Err(e) => warn!("[{}] Connection failed: {}", id, e),
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection on {}: {}", self.local_addr, e);
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        error!("Connection task failed: {}", e);
                    }
                }
            }
        }

        info!("Stopped accepting on {}, {} connection(s) in flight", self.local_addr, tasks.len());
        drop(self.listener);

        let grace = Duration::from_secs(SHUTDOWN_GRACE_SECS);
        let drained = timeout(grace, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!("Connection task failed during shutdown: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("Shutdown grace period elapsed, aborting {} connection(s)", tasks.len());
            tasks.abort_all();
        }

        Ok(())
    }
}
