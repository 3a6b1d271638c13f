//! Outbound path: encode, sign, frame and transmit one payload.

use crate::error::{MessengerError, Result};
use crate::transport::Transport;
use ctrl_types::{codec, Context, Envelope, Payload, RequestId};
use ctrl_verify::Signer;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::trace;

pub(crate) struct Outbox {
    signer: Arc<dyn Signer>,
    transport: Arc<dyn Transport>,
    max_message_size: usize,
}

impl Outbox {
    pub(crate) fn new(
        signer: Arc<dyn Signer>,
        transport: Arc<dyn Transport>,
        max_message_size: usize,
    ) -> Self {
        Self {
            signer,
            transport,
            max_message_size,
        }
    }

    /// Send `payload` to `to` under `request_id`.
    ///
    /// The signature binds the request id and message type, so neither can be
    /// rewritten in the unsigned envelope header.
    pub(crate) async fn send(
        &self,
        ctx: &Context,
        payload: &Payload,
        to: SocketAddr,
        request_id: RequestId,
    ) -> Result<()> {
        if let Some(err) = ctx.err() {
            return Err(MessengerError::from_context(err, request_id));
        }

        let message_type = payload.message_type();
        let body = codec::encode_payload(payload)?;
        let aad = Envelope::associated_data(message_type, request_id);
        let signed = self.signer.sign(&body, &[&aad[..]])?;
        let bytes = Envelope::new(message_type, request_id, signed).to_bytes(self.max_message_size)?;

        ctx.run(self.transport.send_to(&bytes, to))
            .await
            .map_err(|err| MessengerError::from_context(err, request_id))??;

        trace!(
            request_id,
            message_type = %message_type,
            to = %to,
            bytes = bytes.len(),
            "Sent envelope"
        );
        Ok(())
    }
}
