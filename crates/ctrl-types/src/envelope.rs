//! # Signed Envelope
//!
//! The wire unit exchanged between messengers.
//!
//! ## Layout
//!
//! - `Envelope`: version, message type and request id (routing metadata) plus
//!   the `SignedMessage`.
//! - `SignedMessage`: opaque `header_and_body` bytes and the signature over them.
//! - `SignedHeader`: issuer identity, creation timestamp and a replay nonce.
//!
//! The routing metadata is not covered by `header_and_body`; signers bind it
//! by passing it as associated data.

use crate::addr::IsdAs;
use crate::codec;
use crate::errors::CodecError;
use crate::messages::MessageType;
use crate::RequestId;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use uuid::Uuid;

/// Header covered by the signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedHeader {
    /// Identity of the signer.
    pub issuer: IsdAs,

    /// Unix timestamp (seconds) when the message was signed.
    pub timestamp: u64,

    /// Unique nonce for replay prevention within the timestamp window.
    pub nonce: Uuid,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct HeaderAndBody {
    header: SignedHeader,
    #[serde_as(as = "Bytes")]
    body: Vec<u8>,
}

/// A signed blob: encoded header and body plus the signature over them.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    #[serde_as(as = "Bytes")]
    pub header_and_body: Vec<u8>,

    #[serde_as(as = "Bytes")]
    pub signature: Vec<u8>,
}

impl SignedMessage {
    /// Encode `header` and `body` into the bytes a signer signs.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if serialization fails.
    pub fn encode_header_and_body(header: &SignedHeader, body: &[u8]) -> Result<Vec<u8>, CodecError> {
        codec::encode(&HeaderAndBody {
            header: header.clone(),
            body: body.to_vec(),
        })
    }

    /// Decode the header and body without checking the signature.
    ///
    /// Only verifiers should call this; the result is untrusted.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Decode` on malformed bytes.
    pub fn decode_unverified(&self) -> Result<(SignedHeader, Vec<u8>), CodecError> {
        let decoded: HeaderAndBody = codec::decode(&self.header_and_body)?;
        Ok((decoded.header, decoded.body))
    }
}

/// The transport-level container for one control message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version for forward compatibility.
    pub version: u16,

    /// Tag of the payload inside the signed body.
    pub message_type: MessageType,

    /// For requests: identifier chosen by the caller.
    /// For replies: the identifier of the request being answered.
    pub request_id: RequestId,

    pub signed: SignedMessage,
}

impl Envelope {
    /// Current protocol version.
    pub const CURRENT_VERSION: u16 = 1;

    /// Create an envelope at the current version.
    #[must_use]
    pub fn new(message_type: MessageType, request_id: RequestId, signed: SignedMessage) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            message_type,
            request_id,
            signed,
        }
    }

    /// Routing metadata bound into the signature as associated data.
    #[must_use]
    pub fn associated_data(message_type: MessageType, request_id: RequestId) -> [u8; 9] {
        let mut aad = [0u8; 9];
        aad[..8].copy_from_slice(&request_id.to_be_bytes());
        aad[8] = message_type.tag();
        aad
    }

    /// Encode for the wire, rejecting messages above `limit` bytes.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::TooLarge` or `CodecError::Encode`.
    pub fn to_bytes(&self, limit: usize) -> Result<Vec<u8>, CodecError> {
        let bytes = codec::encode(self)?;
        if bytes.len() > limit {
            return Err(CodecError::TooLarge {
                size: bytes.len(),
                limit,
            });
        }
        Ok(bytes)
    }

    /// Decode from the wire and check the version.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::TooLarge`, `CodecError::Decode` or
    /// `CodecError::UnsupportedVersion`.
    pub fn from_bytes(bytes: &[u8], limit: usize) -> Result<Self, CodecError> {
        if bytes.len() > limit {
            return Err(CodecError::TooLarge {
                size: bytes.len(),
                limit,
            });
        }
        let envelope: Envelope = codec::decode(bytes)?;
        if envelope.version != Self::CURRENT_VERSION {
            return Err(CodecError::UnsupportedVersion {
                received: envelope.version,
                supported: Self::CURRENT_VERSION,
            });
        }
        Ok(envelope)
    }
}

/// The output of a successful verification.
///
/// Produced from exactly one `SignedMessage`; never re-verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedMessage {
    pub header: SignedHeader,
    pub body: Vec<u8>,
    pub signed: SignedMessage,
}

impl VerifiedMessage {
    /// The verified signer identity.
    #[must_use]
    pub fn issuer(&self) -> IsdAs {
        self.header.issuer
    }
}
