//! Request id allocation.

use ctrl_types::RequestId;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out request ids from a randomly seeded counter.
///
/// Ids are unique per allocator until the 64-bit counter wraps. The random
/// seed keeps a restarted process from reusing ids a peer may still hold
/// replies for.
#[derive(Debug)]
pub struct RequestIdAllocator {
    next: AtomicU64,
}

impl RequestIdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(rand::random::<u64>())
    }

    #[must_use]
    pub fn starting_at(first: RequestId) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    pub fn next_id(&self) -> RequestId {
        // fetch_add wraps on overflow.
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for RequestIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
