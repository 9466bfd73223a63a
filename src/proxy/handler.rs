//! Protocol handlers
//!
//! The router hands every classified connection to one of two handlers.
//! Both receive the connection wrapped in a [`PrebufferedStream`], so the
//! bytes consumed while sniffing are read again, in order, by the handler.

use std::future::Future;
use std::sync::Arc;

use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::common::Result;
use crate::protocol::PrebufferedStream;
use super::connection::Connection;
use super::forwarder::OriginForwarder;

/// Downstream pipeline for a classified connection
pub trait ProtocolHandler: Send + Sync + 'static {
    /// Name used in logs, metrics and dispatch errors
    fn protocol(&self) -> &'static str;

    /// Take ownership of the connection and serve it to completion
    ///
    /// The stream yields the sniffed bytes before the live connection.
    fn handle<S>(&self, conn: Connection<PrebufferedStream<S>>) -> impl Future<Output = Result<()>> + Send
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static;
}

/// Plaintext request acceptor
///
/// Relays the request bytes, starting with the prebuffered ones, to the
/// origin unchanged.
#[derive(Debug, Clone)]
pub struct PlainHandler {
    forwarder: Arc<OriginForwarder>,
}

impl PlainHandler {
    pub fn new(forwarder: Arc<OriginForwarder>) -> Self {
        Self { forwarder }
    }
}

impl ProtocolHandler for PlainHandler {
    fn protocol(&self) -> &'static str {
        "plaintext"
    }

    fn handle<S>(&self, conn: Connection<PrebufferedStream<S>>) -> impl Future<Output = Result<()>> + Send
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let forwarder = Arc::clone(&self.forwarder);

        async move {
            let (id, peer, stream) = conn.into_parts();
            debug!(
                "[{}] Plaintext request from {} ({} byte(s) prebuffered)",
                id,
                peer,
                stream.prebuffered().len()
            );

            forwarder.relay(id, stream).await?;
            Ok(())
        }
    }
}
