//! # Control Message Families
//!
//! The `MessageType` tag and the typed payloads carried inside envelopes.
//!
//! The dispatcher never inspects payload internals; it routes on
//! `Payload::message_type()` alone.

use crate::addr::IsdAs;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use std::fmt;

// =============================================================================
// MESSAGE TYPE
// =============================================================================

/// Tag identifying the kind of control payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageType {
    /// Interface-ID announcement (keepalive).
    IfId,
    /// Acknowledgement.
    Ack,
    /// Hidden-path segment request.
    HpSegRequest,
    /// Hidden-path segment reply.
    HpSegReply,
    /// Hidden-path segment registration.
    HpSegReg,
    /// Hidden-path configuration request.
    HpCfgRequest,
    /// Hidden-path configuration reply.
    HpCfgReply,
}

impl MessageType {
    /// All known message types.
    pub const ALL: [MessageType; 7] = [
        MessageType::IfId,
        MessageType::Ack,
        MessageType::HpSegRequest,
        MessageType::HpSegReply,
        MessageType::HpSegReg,
        MessageType::HpCfgRequest,
        MessageType::HpCfgReply,
    ];

    /// Stable name used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::IfId => "ifid",
            MessageType::Ack => "ack",
            MessageType::HpSegRequest => "hp_seg_request",
            MessageType::HpSegReply => "hp_seg_reply",
            MessageType::HpSegReg => "hp_seg_reg",
            MessageType::HpCfgRequest => "hp_cfg_request",
            MessageType::HpCfgReply => "hp_cfg_reply",
        }
    }

    /// Returns true for types that answer an earlier request.
    #[must_use]
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            MessageType::Ack | MessageType::HpSegReply | MessageType::HpCfgReply
        )
    }

    /// One-byte tag bound into the signature as associated data.
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            MessageType::IfId => 1,
            MessageType::Ack => 2,
            MessageType::HpSegRequest => 3,
            MessageType::HpSegReply => 4,
            MessageType::HpSegReg => 5,
            MessageType::HpCfgRequest => 6,
            MessageType::HpCfgReply => 7,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// Interface-ID keepalive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IfId {
    /// Originating interface.
    pub orig_if: u64,
}

/// Outcome carried by an acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AckErrCode {
    /// Request accepted.
    Ok,
    /// Temporary failure; the sender may retry.
    Retry,
    /// Request rejected; retrying will not help.
    Reject,
}

/// Acknowledgement of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub err: AckErrCode,
    pub err_desc: String,
}

impl Ack {
    /// Positive acknowledgement.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            err: AckErrCode::Ok,
            err_desc: String::new(),
        }
    }

    /// Retryable negative acknowledgement.
    #[must_use]
    pub fn retry(desc: impl Into<String>) -> Self {
        Self {
            err: AckErrCode::Retry,
            err_desc: desc.into(),
        }
    }

    /// Final negative acknowledgement.
    #[must_use]
    pub fn reject(desc: impl Into<String>) -> Self {
        Self {
            err: AckErrCode::Reject,
            err_desc: desc.into(),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.err == AckErrCode::Ok
    }
}

/// Identifier of a hidden-path group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HpGroupId {
    /// AS owning the group.
    pub owner_as: u64,
    /// Owner-local suffix.
    pub suffix: u16,
}

/// Request for hidden-path segments towards `dst_ia`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpSegReq {
    pub dst_ia: IsdAs,
    pub group_ids: Vec<HpGroupId>,
}

/// Segments of one hidden-path group. Segments are opaque to the messenger.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpSegRecs {
    pub group_id: HpGroupId,
    #[serde_as(as = "Vec<Bytes>")]
    pub segments: Vec<Vec<u8>>,
    /// Non-empty if the registry could not serve this group.
    pub err: String,
}

/// Reply to `HpSegReq`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpSegReply {
    pub recs: Vec<HpSegRecs>,
}

/// Registration of hidden-path segments at a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpSegReg {
    pub recs: HpSegRecs,
}

/// Request for hidden-path group configurations changed since `change_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpCfgReq {
    pub change_id: u64,
}

/// A hidden-path group configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpCfg {
    pub group_id: HpGroupId,
    pub version: u64,
    pub owner: IsdAs,
    pub writers: Vec<IsdAs>,
    pub readers: Vec<IsdAs>,
    pub registries: Vec<IsdAs>,
}

/// Reply to `HpCfgReq`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpCfgReply {
    pub change_id: u64,
    pub cfgs: Vec<HpCfg>,
}

// =============================================================================
// PAYLOAD ENUM
// =============================================================================

/// A typed control payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    IfId(IfId),
    Ack(Ack),
    HpSegRequest(HpSegReq),
    HpSegReply(HpSegReply),
    HpSegReg(HpSegReg),
    HpCfgRequest(HpCfgReq),
    HpCfgReply(HpCfgReply),
}

impl Payload {
    /// The tag of this payload.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::IfId(_) => MessageType::IfId,
            Payload::Ack(_) => MessageType::Ack,
            Payload::HpSegRequest(_) => MessageType::HpSegRequest,
            Payload::HpSegReply(_) => MessageType::HpSegReply,
            Payload::HpSegReg(_) => MessageType::HpSegReg,
            Payload::HpCfgRequest(_) => MessageType::HpCfgRequest,
            Payload::HpCfgReply(_) => MessageType::HpCfgReply,
        }
    }
}

impl From<IfId> for Payload {
    fn from(v: IfId) -> Self {
        Payload::IfId(v)
    }
}

impl From<Ack> for Payload {
    fn from(v: Ack) -> Self {
        Payload::Ack(v)
    }
}

impl From<HpSegReq> for Payload {
    fn from(v: HpSegReq) -> Self {
        Payload::HpSegRequest(v)
    }
}

impl From<HpSegReply> for Payload {
    fn from(v: HpSegReply) -> Self {
        Payload::HpSegReply(v)
    }
}

impl From<HpSegReg> for Payload {
    fn from(v: HpSegReg) -> Self {
        Payload::HpSegReg(v)
    }
}

impl From<HpCfgReq> for Payload {
    fn from(v: HpCfgReq) -> Self {
        Payload::HpCfgRequest(v)
    }
}

impl From<HpCfgReply> for Payload {
    fn from(v: HpCfgReply) -> Self {
        Payload::HpCfgReply(v)
    }
}
