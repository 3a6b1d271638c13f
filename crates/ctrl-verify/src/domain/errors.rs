//! # Verification Errors

use ctrl_types::{CodecError, ContextError, IsdAs};
use std::net::SocketAddr;
use thiserror::Error;
use uuid::Uuid;

/// Errors from the replay cache.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NonceError {
    /// The nonce has already been used (replay attack).
    #[error("Nonce {nonce} has already been used (replay attack)")]
    NonceReused { nonce: Uuid },

    /// The message timestamp is too old.
    #[error("Message timestamp {timestamp} is too old (threshold: {threshold})")]
    MessageTooOld { timestamp: u64, threshold: u64 },

    /// The message timestamp is in the future.
    #[error("Message timestamp {timestamp} is in the future (threshold: {threshold})")]
    MessageFromFuture { timestamp: u64, threshold: u64 },
}

/// Errors that can occur while verifying a signed message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VerifyError {
    /// The signed bytes could not be decoded.
    #[error("Malformed signed message: {0}")]
    Malformed(#[from] CodecError),

    /// Signature does not match the message and associated data.
    #[error("Invalid signature from {issuer}")]
    InvalidSignature { issuer: IsdAs },

    /// No key is known for the signer.
    #[error("Untrusted issuer {issuer}")]
    UntrustedIssuer { issuer: IsdAs },

    /// Verifier is scoped to another issuer.
    #[error("Issuer mismatch: expected {expected}, got {actual}")]
    IssuerMismatch { expected: IsdAs, actual: IsdAs },

    /// Verifier is scoped to another origin server.
    #[error("Origin mismatch: expected {expected}, got {actual:?}")]
    ServerMismatch {
        expected: SocketAddr,
        actual: Option<SocketAddr>,
    },

    /// Scoped twice to different issuers or servers; accepts nothing.
    #[error("Verifier scope is empty: conflicting issuer or server restrictions")]
    ConflictingScope,

    /// Freshness or replay check failed.
    #[error("Stale message: {0}")]
    Stale(#[from] NonceError),

    /// The caller's context finished before verification completed.
    #[error("Verification aborted: {0}")]
    Aborted(#[from] ContextError),
}

/// Errors from signing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignError {
    #[error("Failed to encode signed header: {0}")]
    Codec(#[from] CodecError),

    #[error("Signing key rejected")]
    InvalidKey,
}
