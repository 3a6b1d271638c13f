//! # Error Types
//!
//! Errors produced by the shared types: parsing, encoding and context expiry.

use thiserror::Error;

/// Errors from parsing an `IsdAs` string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AddrParseError {
    /// The string has no `-` separating ISD and AS.
    #[error("Missing ISD-AS separator in {0:?}")]
    MissingSeparator(String),

    /// The ISD part is not a valid 16-bit number.
    #[error("Invalid ISD number: {0:?}")]
    InvalidIsd(String),

    /// The AS part is neither a decimal nor a `hhhh:hhhh:hhhh` value.
    #[error("Invalid AS number: {0:?}")]
    InvalidAs(String),

    /// The AS number does not fit in 48 bits.
    #[error("AS number {0:#x} exceeds 48 bits")]
    AsOutOfRange(u64),
}

/// Errors from encoding or decoding wire data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Serialization failed.
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// Bytes could not be decoded.
    #[error("Decoding failed: {0}")]
    Decode(String),

    /// The envelope carries a protocol version we do not speak.
    #[error("Unsupported envelope version: received {received}, supported {supported}")]
    UnsupportedVersion { received: u16, supported: u16 },

    /// The encoded message exceeds the configured size limit.
    #[error("Message of {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: usize, limit: usize },
}

/// Reason a `Context` finished.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ContextError {
    /// The context was cancelled explicitly.
    #[error("context cancelled")]
    Cancelled,

    /// The context deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}
