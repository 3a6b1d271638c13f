//! Inbound dispatch counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the receive path, one per outcome.
#[derive(Debug, Default)]
pub struct DispatchStats {
    pub received: AtomicU64,
    pub dispatched: AtomicU64,
    pub replies_correlated: AtomicU64,
    /// Matched a request whose caller had already stopped waiting.
    pub replies_abandoned: AtomicU64,
    pub dropped_malformed: AtomicU64,
    pub dropped_unverified: AtomicU64,
    pub dropped_unroutable: AtomicU64,
    pub dropped_unmatched: AtomicU64,
    pub handler_internal_errors: AtomicU64,
    pub auto_replies: AtomicU64,
}

impl DispatchStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> DispatchSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        DispatchSnapshot {
            received: load(&self.received),
            dispatched: load(&self.dispatched),
            replies_correlated: load(&self.replies_correlated),
            replies_abandoned: load(&self.replies_abandoned),
            dropped_malformed: load(&self.dropped_malformed),
            dropped_unverified: load(&self.dropped_unverified),
            dropped_unroutable: load(&self.dropped_unroutable),
            dropped_unmatched: load(&self.dropped_unmatched),
            handler_internal_errors: load(&self.handler_internal_errors),
            auto_replies: load(&self.auto_replies),
        }
    }
}

/// Point-in-time copy of `DispatchStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSnapshot {
    pub received: u64,
    pub dispatched: u64,
    pub replies_correlated: u64,
    pub replies_abandoned: u64,
    pub dropped_malformed: u64,
    pub dropped_unverified: u64,
    pub dropped_unroutable: u64,
    pub dropped_unmatched: u64,
    pub handler_internal_errors: u64,
    pub auto_replies: u64,
}

impl DispatchSnapshot {
    /// Inbound messages that were discarded for any reason.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped_malformed
            + self.dropped_unverified
            + self.dropped_unroutable
            + self.dropped_unmatched
    }
}
