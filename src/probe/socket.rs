use async_trait::async_trait;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use crate::error::MtrError;

/// Receive buffer size requested from the kernel
const RECV_BUFFER_SIZE: usize = 1024 * 1024;

/// The socket a run sends probes on and reads replies from.
///
/// Reads return whole IPv4 datagrams, outer header included, the way a raw
/// ICMP socket delivers them.
#[async_trait]
pub trait ProbeSocket: Send + Sync {
    /// Set the outbound TTL for subsequent sends
    fn set_ttl(&self, ttl: u8) -> io::Result<()>;

    /// Send one ICMP message to `dest`
    fn send_to(&self, packet: &[u8], dest: Ipv4Addr) -> io::Result<usize>;

    /// Wait for the next datagram. Cancel-safe: dropping the future loses
    /// nothing that was not yet returned.
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

#[async_trait]
impl<T: ProbeSocket + ?Sized> ProbeSocket for Arc<T> {
    fn set_ttl(&self, ttl: u8) -> io::Result<()> {
        (**self).set_ttl(ttl)
    }

    fn send_to(&self, packet: &[u8], dest: Ipv4Addr) -> io::Result<usize> {
        (**self).send_to(packet, dest)
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).recv(buf).await
    }
}

/// Raw ICMPv4 socket, registered with the tokio reactor for reads
#[cfg(unix)]
pub struct RawIcmpSocket {
    inner: tokio::io::unix::AsyncFd<Socket>,
}

#[cfg(unix)]
impl RawIcmpSocket {
    /// Open the raw socket. Must be called inside a tokio runtime.
    ///
    /// Fails with [`MtrError::Permission`] when the process lacks the
    /// privilege to open raw sockets.
    pub fn open() -> Result<Self, MtrError> {
        let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
            .map_err(MtrError::from_socket_open)?;
        socket.set_nonblocking(true).map_err(MtrError::Socket)?;
        if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
            tracing::debug!(error = %e, "could not enlarge receive buffer");
        }

        let inner = tokio::io::unix::AsyncFd::new(socket).map_err(MtrError::Socket)?;
        Ok(Self { inner })
    }
}

#[cfg(unix)]
#[async_trait]
impl ProbeSocket for RawIcmpSocket {
    fn set_ttl(&self, ttl: u8) -> io::Result<()> {
        self.inner.get_ref().set_ttl(ttl as u32)
    }

    fn send_to(&self, packet: &[u8], dest: Ipv4Addr) -> io::Result<usize> {
        let addr = SockAddr::from(SocketAddr::V4(SocketAddrV4::new(dest, 0)));
        self.inner.get_ref().send_to(packet, &addr)
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        use std::io::Read;

        loop {
            let mut guard = self.inner.readable().await?;
            match guard.try_io(|inner| (&*inner.get_ref()).read(buf)) {
                Ok(result) => return result,
                Err(_would_block) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_open_reports_privilege_problem() {
        // Either we are privileged and get a socket, or the error explains why not.
        match RawIcmpSocket::open() {
            Ok(socket) => assert!(socket.set_ttl(5).is_ok()),
            Err(MtrError::Permission { .. }) | Err(MtrError::Socket(_)) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
}
