//! # Control-Message Verification
//!
//! Authenticates inbound signed envelopes and signs outbound ones.
//!
//! ## Architecture
//!
//! - **Ports** (`ports/`): the `Verifier` and `Signer` contracts the messenger
//!   depends on.
//! - **Domain** (`domain/`): the HMAC-SHA256 trust-store adapter, the replay
//!   cache and the error taxonomy.
//!
//! ## Security Notes
//!
//! - Scoping (`with_ia`, `with_server`) only narrows; a scoped verifier never
//!   accepts something its parent would reject.
//! - Freshness and replay checks run only after the signature is valid, so
//!   forged messages cannot fill the nonce cache.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod domain;
pub mod ports;

pub use config::VerifierConfig;
pub use domain::errors::{NonceError, SignError, VerifyError};
pub use domain::hmac::{HmacSigner, HmacVerifier};
pub use domain::nonce_cache::TimeBoundedNonceCache;
pub use domain::trust_store::TrustStore;
pub use ports::inbound::{Signer, Verifier};
