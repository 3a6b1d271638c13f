//! # Control Messenger
//!
//! Asynchronous request/reply dispatcher for signed control messages.
//!
//! ## Architecture
//!
//! ```text
//!             outbound calls                      inbound datagrams
//!  caller ──► Messenger::request ──► Outbox ──► Transport ◄── peer
//!                  │                                 │
//!                  ▼                                 ▼
//!          PendingRequestStore ◄── complete ── listen_and_serve
//!                                                    │ verify (Verifier)
//!                                                    ▼
//!                                  HandlerRegistry ──► Handler ──► ResponseWriter
//! ```
//!
//! - **Correlation**: every awaiting call holds a `PendingGuard`; the receive
//!   loop resolves it when a verified reply with the same id arrives from the
//!   call's target.
//! - **Dispatch**: one handler per `MessageType`, invoked on its own task
//!   under a deadline. A panic or timeout is an internal error, never a crash.
//! - **Trust boundary**: nothing reaches a handler or a caller without
//!   passing the `Verifier`.
//!
//! ## Example
//!
//! ```ignore
//! let messenger = Messenger::new(transport, signer, verifier, MessengerConfig::default())?;
//! messenger.add_handler(MessageType::IfId, handler_fn(|_req| async {
//!     HandlerResult::acknowledged()
//! }))?;
//!
//! let server = messenger.clone();
//! tokio::spawn(async move { server.listen_and_serve().await });
//!
//! let segs = messenger
//!     .get_hp_segs(&Context::background(), req, registry_addr, ids.next_id())
//!     .await?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod error;
pub mod handler;
pub mod id;
pub mod messenger;
mod outbox;
pub mod pending;
pub mod registry;
pub mod stats;
pub mod transport;
pub mod writer;

pub use config::{ConfigError, MessengerConfig};
pub use error::{MessengerError, Result};
pub use handler::{handler_fn, FnHandler, Handler, HandlerResult, HandlerStatus, Request};
pub use id::RequestIdAllocator;
pub use messenger::Messenger;
pub use pending::{PendingRequestStore, PendingSnapshot, PendingStats, Reply};
pub use registry::HandlerRegistry;
pub use stats::{DispatchSnapshot, DispatchStats};
pub use transport::{MemoryNetwork, MemoryTransport, Transport, TransportError, UdpTransport};
pub use writer::ResponseWriter;
