//! # Verifier Configuration

use std::time::Duration;

/// Freshness and replay-window settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifierConfig {
    /// Maximum age of a signed header.
    pub max_age: Duration,
    /// Maximum clock skew tolerated for headers from the future.
    pub max_future_skew: Duration,
    /// How long a nonce is remembered (should cover the whole timestamp window).
    pub nonce_retention: Duration,
    /// Minimum interval between nonce-cache sweeps.
    pub gc_interval: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(60),
            max_future_skew: Duration::from_secs(10),
            nonce_retention: Duration::from_secs(120),
            gc_interval: Duration::from_secs(10),
        }
    }
}
