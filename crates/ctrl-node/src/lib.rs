//! # Control Node
//!
//! Wires a `ctrl-messenger` instance to a UDP socket, a trust store loaded
//! from the environment and the node's own handlers.
//!
//! ## Modules
//!
//! - `config/` - Environment-driven `NodeConfig`
//! - `handlers/` - Inbound handlers (interface keepalives)
//! - `node/` - `ControlNode` startup and shutdown
//! - `telemetry/` - `tracing` subscriber setup

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod handlers;
pub mod node;
pub mod telemetry;

pub use config::{LogConfig, NodeConfig, NodeConfigError};
pub use handlers::{KeepaliveHandler, LivenessTable};
pub use node::ControlNode;
