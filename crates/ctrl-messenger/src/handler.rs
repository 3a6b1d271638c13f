//! # Handler Contract
//!
//! A handler processes one inbound request type. It receives a `Request`
//! carrying the verified payload, the peer address, the request id and a
//! single-use `ResponseWriter`, and returns a `HandlerResult` the dispatcher
//! uses to decide on an automatic acknowledgement:
//!
//! | Status          | Automatic reply (unless the handler already replied) |
//! |-----------------|-------------------------------------------------------|
//! | `Ok`            | the result's `ack`, if one is set                     |
//! | `ClientError`   | `Ack` with `Reject` and the reason                    |
//! | `ServerError`   | `Ack` with `Retry` and the reason                     |
//! | `InternalError` | none; logged at error level                           |

use crate::writer::ResponseWriter;
use async_trait::async_trait;
use ctrl_types::{Ack, Context, IsdAs, MessageType, Payload, RequestId};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

/// One verified inbound request.
#[derive(Debug)]
pub struct Request {
    pub message_type: MessageType,
    pub payload: Payload,
    /// Source address of the datagram.
    pub from: SocketAddr,
    pub id: RequestId,
    /// Issuer proven by the signature.
    pub issuer: IsdAs,
    /// Bounded by the messenger's handler timeout.
    pub ctx: Context,
    writer: Option<ResponseWriter>,
}

impl Request {
    /// A request with no reply path, for exercising handlers directly.
    #[must_use]
    pub fn new(payload: Payload, from: SocketAddr, id: RequestId, issuer: IsdAs) -> Self {
        Self {
            message_type: payload.message_type(),
            payload,
            from,
            id,
            issuer,
            ctx: Context::background(),
            writer: None,
        }
    }

    pub(crate) fn with_writer(mut self, ctx: Context, writer: ResponseWriter) -> Self {
        self.ctx = ctx;
        self.writer = Some(writer);
        self
    }

    /// Take the reply path. Returns `None` on the second call.
    pub fn take_writer(&mut self) -> Option<ResponseWriter> {
        self.writer.take()
    }
}

/// Outcome classification of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerStatus {
    Ok,
    /// The request was invalid; retrying it will not help.
    ClientError,
    /// The handler could not serve the request right now.
    ServerError,
    /// The handler failed in a way the peer should not see.
    InternalError,
}

/// What a handler reports back to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerResult {
    pub status: HandlerStatus,
    pub reason: Option<String>,
    /// Acknowledgement to send if the handler did not reply itself.
    pub ack: Option<Ack>,
}

impl HandlerResult {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            status: HandlerStatus::Ok,
            reason: None,
            ack: None,
        }
    }

    /// Success, answered with a positive acknowledgement.
    #[must_use]
    pub fn acknowledged() -> Self {
        Self::ok().with_ack(Ack::ok())
    }

    #[must_use]
    pub fn client_error(reason: impl Into<String>) -> Self {
        Self::failed(HandlerStatus::ClientError, reason)
    }

    #[must_use]
    pub fn server_error(reason: impl Into<String>) -> Self {
        Self::failed(HandlerStatus::ServerError, reason)
    }

    #[must_use]
    pub fn internal_error(reason: impl Into<String>) -> Self {
        Self::failed(HandlerStatus::InternalError, reason)
    }

    /// Override the automatic acknowledgement.
    #[must_use]
    pub fn with_ack(mut self, ack: Ack) -> Self {
        self.ack = Some(ack);
        self
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == HandlerStatus::Ok
    }

    /// The acknowledgement the dispatcher sends on the handler's behalf.
    #[must_use]
    pub fn automatic_ack(&self) -> Option<Ack> {
        if let Some(ack) = &self.ack {
            return Some(ack.clone());
        }
        let reason = self.reason.clone().unwrap_or_default();
        match self.status {
            HandlerStatus::Ok | HandlerStatus::InternalError => None,
            HandlerStatus::ClientError => Some(Ack::reject(reason)),
            HandlerStatus::ServerError => Some(Ack::retry(reason)),
        }
    }

    fn failed(status: HandlerStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: Some(reason.into()),
            ack: None,
        }
    }
}

/// Processes requests of one message type.
///
/// Handlers run concurrently with each other and with the receive loop.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: Request) -> HandlerResult;
}

/// Adapter turning an async closure into a `Handler`.
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, request: Request) -> HandlerResult {
        (self.0)(request).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
