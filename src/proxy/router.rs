//! Connection router
//!
//! Decides, per connection, which pipeline gets it:
//!
//! ```text
//! ACCEPTED ──(plain port)──┬──────────────────────> DISPATCHED_PLAINTEXT
//!                          └─(idle / closed)──────> FAILED
//! ACCEPTED ──(ssl port)────────────────────────────> DISPATCHED_TLS
//! ACCEPTED ──(ssl:allow-plain)──> SNIFFING ──┬─────> DISPATCHED_TLS
//!                                            ├─────> DISPATCHED_PLAINTEXT
//!                                            └─────> FAILED
//! ```
//!
//! Sniffed bytes are kept in a peek buffer and replayed to the chosen handler
//! through a [`PrebufferedStream`].

use std::fmt;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use log::{debug, trace, warn};
use metrics::counter;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::time::{timeout, Instant};

use crate::common::{ProxyError, Result};
use crate::config::{ListenerConfig, SniffSettings};
use crate::protocol::{tls_record_version, Classification, PrebufferedStream, Sniffer};
use super::connection::Connection;
use super::handler::ProtocolHandler;

/// Pipeline a connection was handed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Tls,
    Plaintext,
}

impl fmt::Display for Dispatched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tls => write!(f, "tls"),
            Self::Plaintext => write!(f, "plaintext"),
        }
    }
}

/// Router state of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Accepted,
    Sniffing,
    DispatchedTls,
    DispatchedPlaintext,
    Failed,
}

impl RouteState {
    /// Terminal states end the router's involvement
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::DispatchedTls | Self::DispatchedPlaintext | Self::Failed)
    }

    /// Whether `next` may follow `self`
    pub fn can_advance_to(self, next: RouteState) -> bool {
        use RouteState::*;

        matches!(
            (self, next),
            (Accepted, Sniffing)
                | (Accepted, Failed)
                | (Accepted, DispatchedTls)
                | (Accepted, DispatchedPlaintext)
                | (Sniffing, DispatchedTls)
                | (Sniffing, DispatchedPlaintext)
                | (Sniffing, Failed)
        )
    }

    fn advance(&mut self, next: RouteState) {
        debug_assert!(self.can_advance_to(next), "illegal transition {:?} -> {:?}", self, next);
        trace!("Route state {:?} -> {:?}", self, next);
        *self = next;
    }
}

impl From<Dispatched> for RouteState {
    fn from(dispatched: Dispatched) -> Self {
        match dispatched {
            Dispatched::Tls => Self::DispatchedTls,
            Dispatched::Plaintext => Self::DispatchedPlaintext,
        }
    }
}

/// First read on a new connection, bounded by the idle timeout
///
/// Shared by dual-mode ports (before sniffing) and plain ports (before
/// dispatch), so a client that never sends anything is closed on both.
async fn read_first<S>(stream: &mut S, buf: &mut [u8], idle_timeout: Duration) -> Result<usize>
where
    S: AsyncRead + Unpin,
{
    match timeout(idle_timeout, stream.read(buf)).await {
        Ok(Ok(0)) => Err(ProxyError::PeerClosed),
        Ok(Ok(n)) => Ok(n),
        Ok(Err(e)) => Err(ProxyError::Io(e)),
        Err(_) => Err(ProxyError::IdleTimeout { waited_ms: idle_timeout.as_millis() }),
    }
}

/// Wait for the first bytes of a connection that needs no classification
///
/// Returns what was read so it can be replayed to the handler.
async fn await_first_bytes<S>(stream: &mut S, settings: &SniffSettings) -> Result<Bytes>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; settings.max_bytes.max(1)];
    let n = read_first(stream, &mut buf, settings.idle_timeout).await?;
    buf.truncate(n);
    Ok(Bytes::from(buf))
}

/// Read from `stream` into a peek buffer until the sniffer decides
///
/// While nothing has arrived, reads are bounded by the idle timeout. From the
/// first byte on, the classification timeout and byte budget apply instead.
/// Never reads more than `settings.max_bytes` bytes.
///
/// # Errors
///
/// `IdleTimeout`, `ClassificationTimeout`, `PeerClosed`, `MalformedFirstByte`
/// (strict policy) or an I/O error.
pub async fn sniff<S>(stream: &mut S, settings: &SniffSettings) -> Result<(Dispatched, Bytes)>
where
    S: AsyncRead + Unpin,
{
    let sniffer = Sniffer::new(settings.policy);
    let max_bytes = settings.max_bytes.max(1);
    let mut peek = BytesMut::with_capacity(max_bytes);
    let mut scratch = vec![0u8; max_bytes];

    let mut n = read_first(stream, &mut scratch, settings.idle_timeout).await?;
    let started = Instant::now();

    loop {
        peek.extend_from_slice(&scratch[..n]);
        trace!("Peeked {} byte(s): {:02X?}", peek.len(), &peek[..]);

        match sniffer.classify(&peek)? {
            Classification::Tls => {
                if let Some(version) = tls_record_version(&peek) {
                    debug!("TLS record version {}", version);
                }
                return Ok((Dispatched::Tls, peek.freeze()));
            }
            Classification::Plaintext => return Ok((Dispatched::Plaintext, peek.freeze())),
            Classification::Indeterminate if peek.len() >= max_bytes => {
                return Err(ProxyError::ClassificationTimeout {
                    waited_ms: started.elapsed().as_millis(),
                    buffered: peek.len(),
                });
            }
            Classification::Indeterminate => {}
        }

        let remaining = settings.classification_timeout.saturating_sub(started.elapsed());
        let budget = max_bytes - peek.len();

        n = match timeout(remaining, stream.read(&mut scratch[..budget])).await {
            Ok(Ok(0)) => return Err(ProxyError::PeerClosed),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(ProxyError::Io(e)),
            Err(_) => {
                return Err(ProxyError::ClassificationTimeout {
                    waited_ms: started.elapsed().as_millis(),
                    buffered: peek.len(),
                });
            }
        };
    }
}

/// Connection router
///
/// Shared by every connection task of a listener; holds no per-connection
/// state.
#[derive(Debug)]
pub struct Router<T, P> {
    tls: T,
    plain: P,
}

impl<T, P> Router<T, P>
where
    T: ProtocolHandler,
    P: ProtocolHandler,
{
    pub fn new(tls: T, plain: P) -> Self {
        Self { tls, plain }
    }

    /// Classify `conn` and hand it to exactly one handler
    ///
    /// Resolves when the handler is done with the connection.
    ///
    /// # Errors
    ///
    /// Sniffing errors close the connection before any handler sees it.
    /// Handler errors come back as `HandlerDispatch` and are not retried.
    pub async fn route<S>(&self, conn: Connection<S>, listener: &ListenerConfig) -> Result<Dispatched>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (id, peer, mut stream) = conn.into_parts();
        let mut state = RouteState::Accepted;
        counter!("dual_mode_proxy.connections.accepted").increment(1);

        let waited = if listener.sniffs() {
            state.advance(RouteState::Sniffing);
            sniff(&mut stream, &listener.sniff).await
        } else if listener.tls {
            // The handshake timeout bounds a silent TLS client
            Ok((Dispatched::Tls, Bytes::new()))
        } else {
            await_first_bytes(&mut stream, &listener.sniff)
                .await
                .map(|first| (Dispatched::Plaintext, first))
        };

        let (dispatched, prebuffered) = match waited {
            Ok(decided) => decided,
            Err(e) => {
                state.advance(RouteState::Failed);
                warn!("[{}] Could not classify connection from {}: {}", id, peer, e);
                counter!("dual_mode_proxy.connections.failed", "reason" => e.reason()).increment(1);
                return Err(e);
            }
        };

        state.advance(dispatched.into());
        debug!(
            "[{}] Dispatching {} connection from {} ({} byte(s) prebuffered)",
            id,
            dispatched,
            peer,
            prebuffered.len()
        );
        counter!("dual_mode_proxy.connections.dispatched", "protocol" => dispatched.to_string()).increment(1);

        let conn = Connection::from_parts(id, peer, PrebufferedStream::new(prebuffered, stream));
        let (protocol, result) = match dispatched {
            Dispatched::Tls => (self.tls.protocol(), self.tls.handle(conn).await),
            Dispatched::Plaintext => (self.plain.protocol(), self.plain.handle(conn).await),
        };

        result.map_err(|e| {
            counter!("dual_mode_proxy.connections.failed", "reason" => "handler_dispatch").increment(1);
            ProxyError::HandlerDispatch { protocol, source: Box::new(e) }
        })?;

        Ok(dispatched)
    }
}
