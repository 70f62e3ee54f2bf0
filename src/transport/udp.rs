//! Connected UDP transport.

use super::Transport;
use crate::error::{Error, Result};
use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// UDP transport owning a connected ephemeral socket for one peer.
///
/// Connecting the socket lets the kernel deliver ICMP errors (port
/// unreachable) as ordinary socket errors, which the session treats as
/// an immediate abort rather than a retry.
#[derive(Clone)]
pub struct UdpTransport {
    inner: Arc<UdpTransportInner>,
}

struct UdpTransportInner {
    socket: UdpSocket,
    peer: SocketAddr,
    local_addr: SocketAddr,
}

impl UdpTransport {
    /// Bind an ephemeral socket for the peer's address family and
    /// connect it.
    pub async fn connect(peer: SocketAddr) -> Result<Self> {
        tracing::debug!(target: "snmp_session::transport", snmp.peer = %peer, "connecting UDP transport");

        let io_err = |e: io::Error| Error::Io {
            target: Some(peer),
            source: e,
        };

        let socket = bind_ephemeral_udp_socket(peer).map_err(io_err)?;
        socket.connect(peer).await.map_err(io_err)?;
        let local_addr = socket.local_addr().map_err(io_err)?;

        tracing::debug!(
            target: "snmp_session::transport",
            snmp.peer = %peer,
            snmp.local_addr = %local_addr,
            "UDP transport connected"
        );

        Ok(Self {
            inner: Arc::new(UdpTransportInner {
                socket,
                peer,
                local_addr,
            }),
        })
    }
}

impl Transport for UdpTransport {
    async fn send(&self, data: &[u8]) -> Result<()> {
        tracing::trace!(
            target: "snmp_session::transport",
            snmp.peer = %self.inner.peer,
            snmp.bytes = data.len(),
            "UDP send"
        );
        self.inner.socket.send(data).await.map_err(|e| Error::Io {
            target: Some(self.inner.peer),
            source: e,
        })?;
        Ok(())
    }

    async fn recv(&self, recv_timeout: Duration) -> Result<Bytes> {
        let mut buf = vec![0u8; 65535];

        match timeout(recv_timeout, self.inner.socket.recv(&mut buf)).await {
            Ok(Ok(len)) => {
                buf.truncate(len);
                tracing::trace!(
                    target: "snmp_session::transport",
                    snmp.peer = %self.inner.peer,
                    snmp.bytes = len,
                    "UDP recv complete"
                );
                Ok(Bytes::from(buf))
            }
            Ok(Err(e)) => {
                tracing::trace!(
                    target: "snmp_session::transport",
                    snmp.peer = %self.inner.peer,
                    error = %e,
                    "UDP recv error"
                );
                Err(Error::Io {
                    target: Some(self.inner.peer),
                    source: e,
                })
            }
            Err(_) => Err(Error::Timeout {
                target: Some(self.inner.peer),
                elapsed: recv_timeout,
                retries: 0,
            }),
        }
    }

    fn peer_addr(&self) -> SocketAddr {
        self.inner.peer
    }

    fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }
}

/// Bind an ephemeral UDP socket matching the target's address family.
///
/// IPv6 sockets get `IPV6_V6ONLY` so they never see IPv4-mapped
/// addresses.
fn bind_ephemeral_udp_socket(target: SocketAddr) -> io::Result<UdpSocket> {
    let (domain, bind_addr): (Domain, SocketAddr) = if target.is_ipv6() {
        (Domain::IPV6, "[::]:0".parse().unwrap())
    } else {
        (Domain::IPV4, "0.0.0.0:0".parse().unwrap())
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    if target.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&bind_addr.into())?;

    UdpSocket::from_std(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_binds_matching_family() {
        let transport = UdpTransport::connect("127.0.0.1:16161".parse().unwrap())
            .await
            .unwrap();
        assert!(transport.local_addr().is_ipv4());
        assert_ne!(transport.local_addr().port(), 0);
        assert_eq!(transport.peer_addr().port(), 16161);
    }

    #[tokio::test]
    async fn recv_times_out() {
        let transport = UdpTransport::connect("127.0.0.1:16162".parse().unwrap())
            .await
            .unwrap();
        let err = transport.recv(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[tokio::test]
    async fn loopback_echo() {
        let echo = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let echo_addr = echo.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            if let Ok((len, from)) = echo.recv_from(&mut buf).await {
                let _ = echo.send_to(&buf[..len], from).await;
            }
        });

        let transport = UdpTransport::connect(echo_addr).await.unwrap();
        transport.send(b"ping").await.unwrap();
        let data = transport.recv(Duration::from_secs(1)).await.unwrap();
        assert_eq!(&data[..], b"ping");
    }
}
