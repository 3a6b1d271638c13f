//! Inbound handlers registered by the node.

use async_trait::async_trait;
use ctrl_messenger::{Handler, HandlerResult, Request};
use ctrl_types::{IsdAs, Payload};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::trace;

/// Last time a keepalive was seen, keyed by sender and interface.
pub type LivenessTable = Arc<Mutex<HashMap<(IsdAs, u64), Instant>>>;

/// Records interface keepalives. Keepalives are one-way, so nothing is sent back.
#[derive(Debug, Default)]
pub struct KeepaliveHandler {
    seen: LivenessTable,
}

impl KeepaliveHandler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the liveness table.
    #[must_use]
    pub fn table(&self) -> LivenessTable {
        Arc::clone(&self.seen)
    }
}

#[async_trait]
impl Handler for KeepaliveHandler {
    async fn handle(&self, request: Request) -> HandlerResult {
        let Payload::IfId(ifid) = &request.payload else {
            return HandlerResult::client_error("expected an interface keepalive");
        };
        trace!(issuer = %request.issuer, orig_if = ifid.orig_if, "Keepalive");
        self.seen
            .lock()
            .insert((request.issuer, ifid.orig_if), Instant::now());
        HandlerResult::ok()
    }
}
