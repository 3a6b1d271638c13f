//! In-process datagram network.
//!
//! `MemoryNetwork` is a hub of unbounded channels keyed by address. Every
//! transport bound on the same network can reach every other one, and a
//! send to an unbound address fails with `TransportError::Unreachable`.

use super::{Result, Transport, TransportError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};

type Datagram = (Vec<u8>, SocketAddr);

/// Shared registry of in-memory endpoints. Cloning shares the network.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    endpoints: Arc<DashMap<SocketAddr, mpsc::UnboundedSender<Datagram>>>,
}

impl MemoryNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a new endpoint at `addr`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Io` if the address is already bound.
    pub fn bind(&self, addr: SocketAddr) -> Result<MemoryTransport> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.endpoints.entry(addr) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(TransportError::Io(format!("address {addr} already in use")));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(tx.clone());
            }
        }
        let (closed, _) = watch::channel(false);
        Ok(MemoryTransport {
            addr,
            inbox: tx,
            network: self.clone(),
            rx: Mutex::new(rx),
            closed,
        })
    }

    /// Returns true if an endpoint is bound at `addr`.
    #[must_use]
    pub fn is_bound(&self, addr: &SocketAddr) -> bool {
        self.endpoints.contains_key(addr)
    }

    fn deliver(&self, from: SocketAddr, to: SocketAddr, payload: &[u8]) -> Result<()> {
        let endpoint = self
            .endpoints
            .get(&to)
            .ok_or(TransportError::Unreachable(to))?;
        endpoint
            .send((payload.to_vec(), from))
            .map_err(|_| TransportError::Unreachable(to))
    }

    /// Remove `addr` only while it still routes to `inbox`.
    fn unbind(&self, addr: &SocketAddr, inbox: &mpsc::UnboundedSender<Datagram>) {
        self.endpoints
            .remove_if(addr, |_, bound| bound.same_channel(inbox));
    }
}

/// One endpoint on a `MemoryNetwork`. Unbinds itself on close or drop.
pub struct MemoryTransport {
    addr: SocketAddr,
    inbox: mpsc::UnboundedSender<Datagram>,
    network: MemoryNetwork,
    rx: Mutex<mpsc::UnboundedReceiver<Datagram>>,
    closed: watch::Sender<bool>,
}

impl MemoryTransport {
    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_to(&self, payload: &[u8], to: SocketAddr) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.network.deliver(self.addr, to, payload)
    }

    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr)> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            return Err(TransportError::Closed);
        }
        let mut rx = self.rx.lock().await;
        tokio::select! {
            () = super::raised(&mut closed) => Err(TransportError::Closed),
            datagram = rx.recv() => datagram.ok_or(TransportError::Closed),
        }
    }

    fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    async fn close(&self) -> Result<()> {
        if self.closed.send_replace(true) {
            return Err(TransportError::Closed);
        }
        self.network.unbind(&self.addr, &self.inbox);
        Ok(())
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        if !self.is_closed() {
            self.network.unbind(&self.addr, &self.inbox);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn test_datagram_carries_source() {
        let network = MemoryNetwork::new();
        let a = network.bind(addr(1)).unwrap();
        let b = network.bind(addr(2)).unwrap();

        a.send_to(b"ping", addr(2)).await.unwrap();
        let (bytes, from) = b.recv_from().await.unwrap();
        assert_eq!(bytes, b"ping");
        assert_eq!(from, addr(1));
    }

    #[tokio::test]
    async fn test_unbound_destination_unreachable() {
        let network = MemoryNetwork::new();
        let a = network.bind(addr(1)).unwrap();
        assert_eq!(
            a.send_to(b"x", addr(9)).await,
            Err(TransportError::Unreachable(addr(9)))
        );
    }

    #[tokio::test]
    async fn test_double_bind_rejected() {
        let network = MemoryNetwork::new();
        let _a = network.bind(addr(1)).unwrap();
        assert!(matches!(network.bind(addr(1)), Err(TransportError::Io(_))));
    }

    #[tokio::test]
    async fn test_close_wakes_receiver_and_unbinds() {
        let network = MemoryNetwork::new();
        let a = Arc::new(network.bind(addr(1)).unwrap());

        let receiver = {
            let a = Arc::clone(&a);
            tokio::spawn(async move { a.recv_from().await })
        };
        tokio::task::yield_now().await;

        a.close().await.unwrap();
        assert_eq!(receiver.await.unwrap(), Err(TransportError::Closed));
        assert!(!network.is_bound(&addr(1)));
        assert_eq!(a.close().await, Err(TransportError::Closed));
        assert_eq!(a.send_to(b"x", addr(2)).await, Err(TransportError::Closed));
    }

    #[tokio::test]
    async fn test_drop_unbinds() {
        let network = MemoryNetwork::new();
        drop(network.bind(addr(1)).unwrap());
        assert!(!network.is_bound(&addr(1)));
        assert!(network.bind(addr(1)).is_ok());
    }

    #[tokio::test]
    async fn test_stale_endpoint_leaves_rebound_address_alone() {
        let network = MemoryNetwork::new();
        let stale = network.bind(addr(1)).unwrap();
        stale.close().await.unwrap();

        let fresh = network.bind(addr(1)).unwrap();
        drop(stale);
        assert!(network.is_bound(&addr(1)));

        network.unbind(&addr(1), &mpsc::unbounded_channel().0);
        assert!(network.is_bound(&addr(1)));

        let peer = network.bind(addr(2)).unwrap();
        peer.send_to(b"still here", addr(1)).await.unwrap();
        let (bytes, _) = fresh.recv_from().await.unwrap();
        assert_eq!(bytes, b"still here");
    }
}
