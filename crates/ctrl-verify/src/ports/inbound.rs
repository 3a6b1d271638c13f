//! # Inbound Ports (Driving Ports / API)
//!
//! The contracts the messenger uses to authenticate and seal messages.

use crate::domain::errors::{SignError, VerifyError};
use async_trait::async_trait;
use ctrl_types::{Context, IsdAs, SignedMessage, VerifiedMessage};
use std::net::SocketAddr;
use std::sync::Arc;

/// Validates the authenticity of signed messages.
///
/// Implementations must be thread-safe (`Send + Sync`). Scoping returns a new
/// verifier and leaves `self` untouched; scopes compose, so
/// `v.with_ia(x).with_server(a)` requires both conditions.
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Verify `signed`, which physically arrived from `origin`.
    ///
    /// `associated_data` must match what the signer bound into the signature.
    ///
    /// # Errors
    ///
    /// - `VerifyError::InvalidSignature` - signature or associated data mismatch
    /// - `VerifyError::UntrustedIssuer` - signer is not in the trust store
    /// - `VerifyError::IssuerMismatch` / `VerifyError::ServerMismatch` - scope violated
    /// - `VerifyError::ConflictingScope` - narrowed to two different issuers or servers
    /// - `VerifyError::Stale` - outside the freshness window or replayed
    async fn verify(
        &self,
        ctx: &Context,
        signed: &SignedMessage,
        origin: Option<SocketAddr>,
        associated_data: &[&[u8]],
    ) -> Result<VerifiedMessage, VerifyError>;

    /// Narrow to messages issued by `ia`.
    fn with_ia(&self, ia: IsdAs) -> Arc<dyn Verifier>;

    /// Narrow to messages physically received from `server`.
    fn with_server(&self, server: SocketAddr) -> Arc<dyn Verifier>;
}

/// Seals outbound message bodies.
pub trait Signer: Send + Sync {
    /// Identity placed in the signed header.
    fn issuer(&self) -> IsdAs;

    /// Sign `body`, binding `associated_data` into the signature.
    ///
    /// # Errors
    ///
    /// Returns `SignError` if the header cannot be encoded or the key is unusable.
    fn sign(&self, body: &[u8], associated_data: &[&[u8]]) -> Result<SignedMessage, SignError>;
}
