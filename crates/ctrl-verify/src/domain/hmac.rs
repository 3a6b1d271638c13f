//! # HMAC-SHA256 Verifier and Signer
//!
//! Reference adapters for the `Verifier` and `Signer` ports.
//!
//! The MAC covers `header_and_body` followed by every associated-data slice,
//! each prefixed with its big-endian `u32` length so slice boundaries cannot
//! be shifted. Comparison is constant-time.

use crate::config::VerifierConfig;
use crate::domain::errors::{SignError, VerifyError};
use crate::domain::nonce_cache::{current_timestamp, TimeBoundedNonceCache};
use crate::domain::trust_store::TrustStore;
use crate::ports::inbound::{Signer, Verifier};
use async_trait::async_trait;
use ctrl_types::{Context, IsdAs, SignedHeader, SignedMessage, VerifiedMessage};
use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use sha2::Sha256;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(
    key: &[u8],
    header_and_body: &[u8],
    associated_data: &[&[u8]],
) -> Result<HmacSha256, SignError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SignError::InvalidKey)?;
    mac.update(header_and_body);
    for data in associated_data {
        let len = u32::try_from(data.len()).map_err(|_| SignError::InvalidKey)?;
        mac.update(&len.to_be_bytes());
        mac.update(data);
    }
    Ok(mac)
}

// =============================================================================
// SIGNER
// =============================================================================

/// Signs bodies with a shared secret under a fixed issuer identity.
#[derive(Clone)]
pub struct HmacSigner {
    issuer: IsdAs,
    key: Arc<[u8]>,
}

impl HmacSigner {
    pub fn new(issuer: IsdAs, key: impl Into<Vec<u8>>) -> Self {
        let key: Vec<u8> = key.into();
        Self {
            issuer,
            key: Arc::from(key),
        }
    }

    fn sign_with_header(
        &self,
        header: &SignedHeader,
        body: &[u8],
        associated_data: &[&[u8]],
    ) -> Result<SignedMessage, SignError> {
        let header_and_body = SignedMessage::encode_header_and_body(header, body)?;
        let mac = mac_for(&self.key, &header_and_body, associated_data)?;
        Ok(SignedMessage {
            header_and_body,
            signature: mac.finalize().into_bytes().to_vec(),
        })
    }
}

impl Signer for HmacSigner {
    fn issuer(&self) -> IsdAs {
        self.issuer
    }

    fn sign(&self, body: &[u8], associated_data: &[&[u8]]) -> Result<SignedMessage, SignError> {
        let header = SignedHeader {
            issuer: self.issuer,
            timestamp: current_timestamp(),
            nonce: Uuid::new_v4(),
        };
        self.sign_with_header(&header, body, associated_data)
    }
}

// =============================================================================
// VERIFIER
// =============================================================================

/// Verifies HMAC signatures against a `TrustStore`.
///
/// Scoped copies share the trust store and the replay cache with the
/// verifier they were derived from. Scopes intersect: narrowing to a second,
/// different issuer or server leaves a verifier that rejects everything.
#[derive(Clone)]
pub struct HmacVerifier {
    trust: TrustStore,
    nonces: Arc<Mutex<TimeBoundedNonceCache>>,
    ia: Option<IsdAs>,
    server: Option<SocketAddr>,
    conflict: bool,
}

impl HmacVerifier {
    /// Unscoped verifier accepting any trusted issuer from any origin.
    #[must_use]
    pub fn new(trust: TrustStore, config: VerifierConfig) -> Self {
        Self {
            trust,
            nonces: Arc::new(Mutex::new(TimeBoundedNonceCache::new(&config))),
            ia: None,
            server: None,
            conflict: false,
        }
    }

    #[must_use]
    pub fn scoped_ia(&self) -> Option<IsdAs> {
        self.ia
    }

    #[must_use]
    pub fn scoped_server(&self) -> Option<SocketAddr> {
        self.server
    }

    /// True once two scopes disagreed; such a verifier accepts nothing.
    #[must_use]
    pub fn is_empty_scope(&self) -> bool {
        self.conflict
    }

    fn narrow_ia(&self, ia: IsdAs) -> Self {
        let mut scoped = self.clone();
        match self.ia {
            Some(current) if current != ia => scoped.conflict = true,
            _ => scoped.ia = Some(ia),
        }
        scoped
    }

    fn narrow_server(&self, server: SocketAddr) -> Self {
        let mut scoped = self.clone();
        match self.server {
            Some(current) if current != server => scoped.conflict = true,
            _ => scoped.server = Some(server),
        }
        scoped
    }

    fn check_server(&self, origin: Option<SocketAddr>) -> Result<(), VerifyError> {
        match self.server {
            Some(expected) if origin != Some(expected) => Err(VerifyError::ServerMismatch {
                expected,
                actual: origin,
            }),
            _ => Ok(()),
        }
    }

    fn check_issuer(&self, actual: IsdAs) -> Result<(), VerifyError> {
        match self.ia {
            Some(expected) if expected != actual => {
                Err(VerifyError::IssuerMismatch { expected, actual })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Verifier for HmacVerifier {
    async fn verify(
        &self,
        ctx: &Context,
        signed: &SignedMessage,
        origin: Option<SocketAddr>,
        associated_data: &[&[u8]],
    ) -> Result<VerifiedMessage, VerifyError> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        if self.conflict {
            return Err(VerifyError::ConflictingScope);
        }

        self.check_server(origin)?;

        let (header, body) = signed.decode_unverified()?;
        let issuer = header.issuer;

        let key = self
            .trust
            .get(&issuer)
            .ok_or(VerifyError::UntrustedIssuer { issuer })?;
        let mac = mac_for(&key, &signed.header_and_body, associated_data)
            .map_err(|_| VerifyError::InvalidSignature { issuer })?;
        mac.verify_slice(&signed.signature)
            .map_err(|_| VerifyError::InvalidSignature { issuer })?;

        self.check_issuer(issuer)?;

        self.nonces
            .lock()
            .validate_and_add(header.nonce, header.timestamp)?;

        debug!(issuer = %issuer, origin = ?origin, "Signed message verified");

        Ok(VerifiedMessage {
            header,
            body,
            signed: signed.clone(),
        })
    }

    fn with_ia(&self, ia: IsdAs) -> Arc<dyn Verifier> {
        Arc::new(self.narrow_ia(ia))
    }

    fn with_server(&self, server: SocketAddr) -> Arc<dyn Verifier> {
        Arc::new(self.narrow_server(server))
    }
}
