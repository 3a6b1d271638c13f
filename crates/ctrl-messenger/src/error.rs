//! Error types for the messenger.

use crate::config::ConfigError;
use crate::transport::TransportError;
use ctrl_types::{Ack, CodecError, ContextError, MessageType, RequestId};
use ctrl_verify::SignError;
use thiserror::Error;

/// Errors surfaced by messenger operations.
#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Signing failed: {0}")]
    Sign(#[from] SignError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The caller's deadline passed before the operation finished.
    #[error("Request {request_id} timed out")]
    Timeout { request_id: RequestId },

    /// The caller's context was cancelled.
    #[error("Request {request_id} cancelled")]
    Cancelled { request_id: RequestId },

    /// Another call is already waiting on this request identifier.
    #[error("Request id {0} is already pending")]
    DuplicateRequestId(RequestId),

    #[error("A handler for {0} is already registered")]
    DuplicateHandler(MessageType),

    /// The correlated reply has a type the call cannot use.
    #[error("Request {request_id} expected {expected} reply, received {received}")]
    UnexpectedReply {
        request_id: RequestId,
        expected: MessageType,
        received: MessageType,
    },

    /// The peer answered with a negative acknowledgement.
    #[error("Request {request_id} rejected by peer: {ack:?}")]
    Rejected { request_id: RequestId, ack: Ack },

    /// The request this writer belongs to was already answered.
    #[error("Request {request_id} already replied to")]
    AlreadyReplied { request_id: RequestId },

    #[error("{0} is not a reply message type")]
    NotAReply(MessageType),

    #[error("Messenger is already serving")]
    AlreadyServing,

    #[error("Messenger is closed")]
    Closed,
}

impl MessengerError {
    pub(crate) fn from_context(err: ContextError, request_id: RequestId) -> Self {
        match err {
            ContextError::Cancelled => MessengerError::Cancelled { request_id },
            ContextError::DeadlineExceeded => MessengerError::Timeout { request_id },
        }
    }

    /// Returns true if the caller's deadline or cancellation ended the call.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(
            self,
            MessengerError::Timeout { .. } | MessengerError::Cancelled { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MessengerError>;
