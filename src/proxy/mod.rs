//! Proxy service module
//!
//! This module implements the connection side of the proxy: per-port
//! listeners, the router that classifies each connection, the plaintext
//! handler and the relay to the origin.

mod connection;
mod forwarder;
mod handler;
mod listener;
mod router;
mod service;

pub use connection::Connection;
pub use forwarder::{OriginForwarder, Transferred};
pub use handler::{PlainHandler, ProtocolHandler};
pub use listener::DualModeListener;
pub use router::{sniff, Dispatched, RouteState, Router};
pub use service::{ProxyHandle, ProxyService, ServiceRouter};
