//! # Control Types Crate
//!
//! Types shared by every layer of the control-plane messaging stack.
//!
//! ## Contents
//!
//! - **Addressing**: `IsdAs` issuer identities.
//! - **Message families**: the `MessageType` tag and the `Payload` enum that
//!   carries one typed control payload per tag.
//! - **Envelope**: the wire unit (`Envelope`) wrapping a `SignedMessage`.
//! - **Context**: a boundable, cancellable execution context for outbound calls.
//!
//! Nothing in this crate touches the network; encoding goes through `codec`.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod addr;
pub mod codec;
pub mod context;
pub mod envelope;
pub mod errors;
pub mod messages;

pub use addr::IsdAs;
pub use context::{CancelHandle, Context};
pub use envelope::{Envelope, SignedHeader, SignedMessage, VerifiedMessage};
pub use errors::{AddrParseError, CodecError, ContextError};
pub use messages::{
    Ack, AckErrCode, HpCfg, HpCfgReply, HpCfgReq, HpGroupId, HpSegRecs, HpSegReg, HpSegReply,
    HpSegReq, IfId, MessageType, Payload,
};

/// The 64-bit identifier correlating an outbound call with its reply.
pub type RequestId = u64;
