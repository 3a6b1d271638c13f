//! Single-use reply path handed to handlers.

use crate::error::{MessengerError, Result};
use crate::outbox::Outbox;
use ctrl_types::{Ack, Context, HpCfgReply, HpSegReply, Payload, RequestId};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Sends the reply to exactly one inbound request.
///
/// Every reply method consumes the writer. The dispatcher shares the
/// `replied` flag, so an automatic acknowledgement is suppressed once the
/// handler answered on its own.
pub struct ResponseWriter {
    outbox: Arc<Outbox>,
    to: SocketAddr,
    request_id: RequestId,
    replied: Arc<AtomicBool>,
}

impl ResponseWriter {
    pub(crate) fn new(
        outbox: Arc<Outbox>,
        to: SocketAddr,
        request_id: RequestId,
        replied: Arc<AtomicBool>,
    ) -> Self {
        Self {
            outbox,
            to,
            request_id,
            replied,
        }
    }

    /// Peer the reply goes to.
    #[must_use]
    pub fn to(&self) -> SocketAddr {
        self.to
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    pub async fn send_ack_reply(self, ctx: &Context, ack: Ack) -> Result<()> {
        self.send_reply(ctx, Payload::Ack(ack)).await
    }

    pub async fn send_hp_seg_reply(self, ctx: &Context, reply: HpSegReply) -> Result<()> {
        self.send_reply(ctx, Payload::HpSegReply(reply)).await
    }

    pub async fn send_hp_cfg_reply(self, ctx: &Context, reply: HpCfgReply) -> Result<()> {
        self.send_reply(ctx, Payload::HpCfgReply(reply)).await
    }

    /// Send any reply-class payload, correlated to the original request id.
    ///
    /// The reply slot is claimed before transmission; a failed send is not
    /// retried through this request.
    ///
    /// # Errors
    ///
    /// - `MessengerError::NotAReply` - payload is a request type
    /// - `MessengerError::AlreadyReplied` - the request was already answered
    /// - transport, signing or context errors from the send itself
    pub async fn send_reply(self, ctx: &Context, payload: Payload) -> Result<()> {
        let message_type = payload.message_type();
        if !message_type.is_reply() {
            return Err(MessengerError::NotAReply(message_type));
        }
        if self.replied.swap(true, Ordering::AcqRel) {
            return Err(MessengerError::AlreadyReplied {
                request_id: self.request_id,
            });
        }

        self.outbox
            .send(ctx, &payload, self.to, self.request_id)
            .await?;
        debug!(
            request_id = self.request_id,
            message_type = %message_type,
            to = %self.to,
            "Sent reply"
        );
        Ok(())
    }
}

impl std::fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseWriter")
            .field("to", &self.to)
            .field("request_id", &self.request_id)
            .field("replied", &self.replied.load(Ordering::Acquire))
            .finish()
    }
}
