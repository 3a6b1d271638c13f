//! UDP transport backed by `tokio::net::UdpSocket`.

use super::{Result, Transport, TransportError};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio::sync::watch;

/// Largest UDP payload over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// A bound UDP socket.
pub struct UdpTransport {
    socket: UdpSocket,
    local: SocketAddr,
    closed: watch::Sender<bool>,
}

impl UdpTransport {
    /// Bind to a local address (e.g. `0.0.0.0:30041`).
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if binding fails.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await.map_err(io_error)?;
        let local = socket.local_addr().map_err(io_error)?;
        let (closed, _) = watch::channel(false);
        Ok(Self {
            socket,
            local,
            closed,
        })
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// ICMP-driven errors on a connectionless socket are reported by the next
/// socket call and do not make the socket unusable.
fn classify(err: io::Error, to: Option<SocketAddr>) -> TransportError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => match to {
            Some(to) => TransportError::Unreachable(to),
            None => TransportError::Transient(err.to_string()),
        },
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => {
            TransportError::Transient(err.to_string())
        }
        _ => io_error(err),
    }
}

fn io_error(err: io::Error) -> TransportError {
    TransportError::Io(err.to_string())
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send_to(&self, payload: &[u8], to: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if payload.len() > MAX_DATAGRAM_SIZE {
            return Err(TransportError::PayloadTooLarge {
                size: payload.len(),
                limit: MAX_DATAGRAM_SIZE,
            });
        }
        self.socket
            .send_to(payload, to)
            .await
            .map(|_| ())
            .map_err(|e| classify(e, Some(to)))
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr)> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(TransportError::Closed);
        }
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
        tokio::select! {
            () = super::raised(&mut closed) => Err(TransportError::Closed),
            received = self.socket.recv_from(&mut buf) => {
                let (len, from) = received.map_err(|e| classify(e, None))?;
                buf.truncate(len);
                Ok((buf, from))
            }
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    async fn close(&self) -> Result<()> {
        if self.closed.send_replace(true) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    #[tokio::test]
    async fn test_loopback_round_trip() {
        let a = UdpTransport::bind(loopback()).await.unwrap();
        let b = UdpTransport::bind(loopback()).await.unwrap();

        a.send_to(b"hello", b.local_addr()).await.unwrap();
        let (bytes, from) = b.recv_from().await.unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(from, a.local_addr());
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let a = UdpTransport::bind(loopback()).await.unwrap();
        let payload = vec![0u8; MAX_DATAGRAM_SIZE + 1];
        assert!(matches!(
            a.send_to(&payload, a.local_addr()).await,
            Err(TransportError::PayloadTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_close_is_single_shot() {
        let a = UdpTransport::bind(loopback()).await.unwrap();
        a.close().await.unwrap();
        assert_eq!(a.recv_from().await, Err(TransportError::Closed));
        assert_eq!(a.close().await, Err(TransportError::Closed));
    }
}
