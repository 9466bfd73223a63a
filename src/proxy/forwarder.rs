//! Data forwarding module
//!
//! Relays a classified client stream to the origin in both directions.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, trace};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use uuid::Uuid;

use crate::common::{ProxyError, Result};

/// Bytes moved by one relayed connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transferred {
    /// Client to origin
    pub upstream: u64,
    /// Origin to client
    pub downstream: u64,
}

/// Connects to the origin and relays traffic
#[derive(Debug, Clone)]
pub struct OriginForwarder {
    target: String,
    buffer_size: usize,
    connect_timeout: Duration,
    idle_timeout: Duration,
}

impl OriginForwarder {
    /// Create a forwarder for `target` (host:port)
    ///
    /// A relay with no traffic in either direction for `idle_timeout` is
    /// closed.
    pub fn new(
        target: impl Into<String>,
        buffer_size: usize,
        connect_timeout: Duration,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            target: target.into(),
            buffer_size,
            connect_timeout,
            idle_timeout,
        }
    }

    /// Connect to the origin and relay until both directions are done
    ///
    /// Each direction half-closes its destination when its source reaches
    /// EOF, so an origin that closes after responding still lets the client
    /// read the whole response.
    pub async fn relay<S>(&self, id: Uuid, client: S) -> Result<Transferred>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let origin = timeout(self.connect_timeout, TcpStream::connect(self.target.as_str()))
            .await
            .map_err(|_| {
                ProxyError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("Connecting to {} timed out", self.target),
                ))
            })?
            .map_err(ProxyError::Io)?;
        origin.set_nodelay(true)?;

        debug!("[{}] Connected to origin {}", id, self.target);

        let (client_reader, client_writer) = tokio::io::split(client);
        let (origin_reader, origin_writer) = origin.into_split();

        let activity = Activity::new();
        let relay = async {
            tokio::join!(
                pump(client_reader, origin_writer, self.buffer_size, &activity),
                pump(origin_reader, client_writer, self.buffer_size, &activity),
            )
        };

        tokio::select! {
            (upstream, downstream) = relay => {
                debug!("[{}] Relay finished: {} bytes up, {} bytes down", id, upstream, downstream);
                Ok(Transferred { upstream, downstream })
            }
            _ = activity.idle_for(self.idle_timeout) => {
                debug!("[{}] Relay idle for {:?}, closing", id, self.idle_timeout);
                Err(ProxyError::IdleTimeout { waited_ms: self.idle_timeout.as_millis() })
            }
        }
    }
}

/// Last time either direction of a relay moved data
struct Activity {
    started: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.started.elapsed().as_millis() as u64;
        self.last_ms.store(now, Ordering::Relaxed);
    }

    fn quiet(&self) -> Duration {
        let last = Duration::from_millis(self.last_ms.load(Ordering::Relaxed));
        self.started.elapsed().saturating_sub(last)
    }

    /// Resolves once nothing has moved for `limit`
    async fn idle_for(&self, limit: Duration) {
        loop {
            let quiet = self.quiet();
            if quiet >= limit {
                return;
            }
            sleep(limit - quiet).await;
        }
    }
}

/// Copy until EOF or error, then shut down the writer
async fn pump<R, W>(mut reader: R, mut writer: W, buffer_size: usize, activity: &Activity) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; buffer_size];
    let mut total = 0u64;

    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                if let Err(e) = writer.write_all(&buffer[..n]).await {
                    trace!("Relay write failed: {}", e);
                    break;
                }
                total += n as u64;
                activity.touch();
            }
            Err(e) => {
                trace!("Relay read failed: {}", e);
                break;
            }
        }
    }

    // Peer may already be gone
    let _ = writer.shutdown().await;
    total
}
