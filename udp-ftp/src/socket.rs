//! Async UDP socket abstraction.
//!
//! [`Transport`] is the seam between protocol logic and the network: the
//! stop-and-wait engine and both endpoints are generic over it, so tests can
//! slot a [`crate::simulator::Simulator`] in front of a real [`Socket`].
//! This module owns only byte I/O.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// Datagram send/receive, one whole datagram per call.
pub trait Transport: Send + Sync {
    /// Address this endpoint is bound to.
    fn local_addr(&self) -> SocketAddr;

    /// Send `datagram` as a single UDP datagram to `dest`.
    fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> impl Future<Output = io::Result<()>> + Send;

    /// Receive the next datagram, keeping at most `capacity` bytes of it.
    ///
    /// Bytes beyond `capacity` are discarded, just as with a fixed-size UDP
    /// receive buffer.
    fn recv_from(&self, capacity: usize) -> impl Future<Output = io::Result<(Vec<u8>, SocketAddr)>> + Send;
}

/// An async UDP socket.
///
/// All methods are `&self` so the socket can be shared across tasks if needed.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }
}

impl Transport for Socket {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.inner.send_to(datagram, dest).await?;
        Ok(())
    }

    async fn recv_from(&self, capacity: usize) -> io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; capacity];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn datagram_roundtrip_over_loopback() {
        let a = Socket::bind(loopback()).await.unwrap();
        let b = Socket::bind(loopback()).await.unwrap();
        a.send_to(b"ping", b.local_addr()).await.unwrap();
        let (bytes, from) = b.recv_from(64).await.unwrap();
        assert_eq!(bytes, b"ping");
        assert_eq!(from, a.local_addr());
    }

    #[tokio::test]
    async fn receive_capacity_truncates() {
        let a = Socket::bind(loopback()).await.unwrap();
        let b = Socket::bind(loopback()).await.unwrap();
        a.send_to(&[7u8; 100], b.local_addr()).await.unwrap();
        let (bytes, _) = b.recv_from(16).await.unwrap();
        assert_eq!(bytes.len(), 16);
    }
}
