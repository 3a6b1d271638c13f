//! # Domain Layer
//!
//! HMAC trust-store verification, replay prevention and the error taxonomy.

pub mod errors;
pub mod hmac;
pub mod nonce_cache;
pub mod trust_store;
