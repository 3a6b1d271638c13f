//! # Transport Abstraction
//!
//! A minimal async datagram interface for moving envelopes between messengers.
//!
//! - **Byte-Oriented**: the transport knows nothing about envelopes or
//!   payloads. It moves opaque buffers to and from opaque addresses.
//! - **Connectionless**: every send names its destination and every receive
//!   reports its source; request/reply is built on top by the messenger.

pub mod memory;
pub mod udp;

use async_trait::async_trait;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::sync::watch;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use udp::UdpTransport;

/// Errors that occur at the network/transport layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The transport was closed locally.
    #[error("Transport closed")]
    Closed,

    /// No endpoint is reachable at the destination.
    #[error("Destination {0} unreachable")]
    Unreachable(SocketAddr),

    /// The payload does not fit in one datagram.
    #[error("Payload of {size} bytes exceeds transport limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    /// A failure that does not invalidate the transport.
    #[error("Transient transport error: {0}")]
    Transient(String),

    /// An I/O failure that leaves the transport unusable.
    #[error("I/O error: {0}")]
    Io(String),
}

impl TransportError {
    /// Returns true if the receive loop cannot continue after this error.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransportError::Closed | TransportError::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Datagram transport used by the messenger.
///
/// This trait is object-safe (`Arc<dyn Transport>`).
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send `payload` to `to`.
    ///
    /// Completion means the datagram was handed to the network, not delivered.
    async fn send_to(&self, payload: &[u8], to: SocketAddr) -> Result<()>;

    /// Wait for the next datagram. Returns `TransportError::Closed` once
    /// `close` has been called.
    async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr)>;

    /// The address peers use to reach this transport.
    fn local_addr(&self) -> SocketAddr;

    /// Release the transport. A second call fails with `TransportError::Closed`.
    async fn close(&self) -> Result<()>;
}

/// Resolves once `flag` is set to true.
pub(crate) async fn raised(flag: &mut watch::Receiver<bool>) {
    // The sender lives as long as its owner; an error means it is gone.
    let _ = flag.wait_for(|set| *set).await;
}
