//! Transport abstraction: one connectionless channel bound to one peer.
//!
//! The session's exchange loop owns deadlines and response correlation;
//! a transport only moves datagrams and reports how long it is willing
//! to wait for one.

mod mock;
mod udp;

pub use mock::{MockResponse, MockTransport, ResponseBuilder};
pub use udp::UdpTransport;

use crate::error::Result;
use bytes::Bytes;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

/// Client-side transport.
///
/// `Clone` is required so the session can hand a handle to its exchange
/// loop while retaining ownership; implementations share state behind an
/// `Arc`, making clones cheap.
pub trait Transport: Send + Sync + Clone {
    /// Send one datagram to the peer.
    fn send(&self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Receive one datagram, waiting at most `timeout`.
    ///
    /// Resolves to [`crate::error::Error::Timeout`] on expiry and
    /// [`crate::error::Error::Io`] when the channel reports a peer-level
    /// failure (e.g. ICMP port unreachable on a connected UDP socket).
    fn recv(&self, timeout: Duration) -> impl Future<Output = Result<Bytes>> + Send;

    /// The peer this channel is bound to.
    fn peer_addr(&self) -> SocketAddr;

    /// Local bind address.
    fn local_addr(&self) -> SocketAddr;
}
