//! Accepted connection

use std::net::SocketAddr;

use uuid::Uuid;

/// A client connection with its identity
///
/// Owned by the router until classification, then moved into exactly one
/// protocol handler. Dropping it closes the stream.
#[derive(Debug)]
pub struct Connection<S> {
    id: Uuid,
    peer: SocketAddr,
    stream: S,
}

impl<S> Connection<S> {
    /// Wrap a freshly accepted stream, assigning a new id
    pub fn new(peer: SocketAddr, stream: S) -> Self {
        Self::from_parts(Uuid::new_v4(), peer, stream)
    }

    /// Rebuild a connection, keeping an existing id
    pub fn from_parts(id: Uuid, peer: SocketAddr, stream: S) -> Self {
        Self { id, peer, stream }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn into_stream(self) -> S {
        self.stream
    }

    pub fn into_parts(self) -> (Uuid, SocketAddr, S) {
        (self.id, self.peer, self.stream)
    }

    /// Replace the stream, keeping id and peer
    pub fn map<T>(self, f: impl FnOnce(S) -> T) -> Connection<T> {
        Connection {
            id: self.id,
            peer: self.peer,
            stream: f(self.stream),
        }
    }
}
