//! # Time-Bounded Nonce Cache
//!
//! Replay prevention for verified control messages.
//!
//! - A header is accepted only if its timestamp lies in
//!   `[now - max_age, now + max_future_skew]`.
//! - Within that window each nonce is accepted once.
//! - Nonces older than the retention window are swept periodically, which
//!   bounds memory without reopening the replay window.

use crate::config::VerifierConfig;
use crate::domain::errors::NonceError;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Time-bounded cache of seen nonces.
pub struct TimeBoundedNonceCache {
    /// Map of nonce -> timestamp carried by the message.
    cache: HashMap<Uuid, u64>,
    max_age_secs: u64,
    max_future_skew_secs: u64,
    retention_secs: u64,
    gc_interval_secs: u64,
    last_gc: u64,
}

impl TimeBoundedNonceCache {
    /// Create a cache with the given window settings.
    #[must_use]
    pub fn new(config: &VerifierConfig) -> Self {
        Self {
            cache: HashMap::new(),
            max_age_secs: config.max_age.as_secs(),
            max_future_skew_secs: config.max_future_skew.as_secs(),
            retention_secs: config.nonce_retention.as_secs(),
            gc_interval_secs: config.gc_interval.as_secs(),
            last_gc: current_timestamp(),
        }
    }

    /// Validate the timestamp, then check and record the nonce.
    ///
    /// # Errors
    ///
    /// - `NonceError::MessageTooOld` - timestamp older than `max_age`
    /// - `NonceError::MessageFromFuture` - timestamp beyond `max_future_skew`
    /// - `NonceError::NonceReused` - nonce already seen
    pub fn validate_and_add(&mut self, nonce: Uuid, timestamp: u64) -> Result<(), NonceError> {
        self.validate_and_add_at(nonce, timestamp, current_timestamp())
    }

    /// As `validate_and_add`, with an explicit `now`.
    pub fn validate_and_add_at(
        &mut self,
        nonce: Uuid,
        timestamp: u64,
        now: u64,
    ) -> Result<(), NonceError> {
        // Timestamp first: it bounds everything the cache has to remember.
        let min_valid = now.saturating_sub(self.max_age_secs);
        let max_valid = now.saturating_add(self.max_future_skew_secs);

        if timestamp < min_valid {
            return Err(NonceError::MessageTooOld {
                timestamp,
                threshold: min_valid,
            });
        }
        if timestamp > max_valid {
            return Err(NonceError::MessageFromFuture {
                timestamp,
                threshold: max_valid,
            });
        }

        if now.saturating_sub(self.last_gc) > self.gc_interval_secs {
            self.garbage_collect(now);
            self.last_gc = now;
        }

        if self.cache.contains_key(&nonce) {
            return Err(NonceError::NonceReused { nonce });
        }
        self.cache.insert(nonce, timestamp);
        Ok(())
    }

    #[must_use]
    pub fn contains(&self, nonce: &Uuid) -> bool {
        self.cache.contains_key(nonce)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn garbage_collect(&mut self, now: u64) {
        let expiry_threshold = now.saturating_sub(self.retention_secs);
        self.cache.retain(|_, &mut ts| ts > expiry_threshold);
    }
}

impl Default for TimeBoundedNonceCache {
    fn default() -> Self {
        Self::new(&VerifierConfig::default())
    }
}

/// Current Unix timestamp in seconds.
pub(crate) fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
