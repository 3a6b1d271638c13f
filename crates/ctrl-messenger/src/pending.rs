//! Pending Request Store - correlates outbound calls with inbound replies.
//!
//! Flow:
//! 1. The caller registers `(request_id, target, expected reply type)` and
//!    receives a `PendingGuard`.
//! 2. The caller sends the request.
//! 3. The receive loop decodes a reply and calls `complete()`.
//! 4. The caller awaits the guard, bounded by its context.
//!
//! The guard removes its entry when dropped, so a caller that times out, is
//! cancelled or simply abandons the future never leaves a stale slot behind.

use crate::error::{MessengerError, Result};
use ctrl_types::{IsdAs, MessageType, Payload, RequestId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::debug;

/// A verified inbound reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub request_id: RequestId,
    pub from: SocketAddr,
    pub issuer: IsdAs,
    pub payload: Payload,
}

impl Reply {
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }
}

/// What a waiting caller receives.
#[derive(Debug)]
pub enum Resolution {
    Reply(Reply),
    /// The messenger shut down before a reply arrived.
    Closed,
}

/// Why an inbound reply did not match any waiting caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unmatched {
    /// No caller waits on this id.
    UnknownId,
    /// A caller waits on this id, but for a different peer.
    WrongPeer { expected: SocketAddr },
    /// A caller waits on this id, but for a different reply type.
    WrongType { expected: MessageType },
}

/// Result of offering a reply to the store.
#[derive(Debug)]
pub enum Completion {
    /// Handed to the waiting caller.
    Delivered,
    /// Matched, but the caller stopped waiting in the meantime.
    Abandoned,
    /// Did not match; the reply is returned untouched.
    Unmatched(Reply, Unmatched),
}

struct PendingRequest {
    sender: oneshot::Sender<Resolution>,
    /// Distinguishes successive registrations of the same id.
    seq: u64,
    target: SocketAddr,
    request_type: MessageType,
    expected: MessageType,
    created_at: Instant,
}

/// Statistics for the pending request store
#[derive(Debug, Default)]
pub struct PendingStats {
    pub total_registered: AtomicU64,
    pub total_completed: AtomicU64,
    pub total_timeouts: AtomicU64,
    /// Cancelled, abandoned, or released after a send failure.
    pub total_cancelled: AtomicU64,
    /// Failed because the messenger closed.
    pub total_closed: AtomicU64,
}

impl PendingStats {
    #[must_use]
    pub fn snapshot(&self) -> PendingSnapshot {
        PendingSnapshot {
            registered: self.total_registered.load(Ordering::Relaxed),
            completed: self.total_completed.load(Ordering::Relaxed),
            timeouts: self.total_timeouts.load(Ordering::Relaxed),
            cancelled: self.total_cancelled.load(Ordering::Relaxed),
            closed: self.total_closed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of `PendingStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingSnapshot {
    pub registered: u64,
    pub completed: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub closed: u64,
}

/// Pending request store keyed by request id.
#[derive(Default)]
pub struct PendingRequestStore {
    pending: DashMap<RequestId, PendingRequest>,
    next_seq: AtomicU64,
    stats: PendingStats,
}

impl PendingRequestStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call waiting on `request_id` from `target`.
    ///
    /// The reply is accepted if its type is `expected` or `Ack`.
    ///
    /// # Errors
    ///
    /// `MessengerError::DuplicateRequestId` if the id is already pending.
    pub fn register(
        self: &Arc<Self>,
        request_id: RequestId,
        target: SocketAddr,
        request_type: MessageType,
        expected: MessageType,
    ) -> Result<PendingGuard> {
        let (tx, rx) = oneshot::channel();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        match self.pending.entry(request_id) {
            Entry::Occupied(_) => return Err(MessengerError::DuplicateRequestId(request_id)),
            Entry::Vacant(slot) => {
                slot.insert(PendingRequest {
                    sender: tx,
                    seq,
                    target,
                    request_type,
                    expected,
                    created_at: Instant::now(),
                });
            }
        }
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);

        debug!(
            request_id,
            target = %target,
            request_type = %request_type,
            expected = %expected,
            "Registered pending request"
        );

        Ok(PendingGuard {
            store: Arc::clone(self),
            request_id,
            seq,
            rx: Some(rx),
            released: false,
        })
    }

    /// Offer an inbound reply to the waiting caller, if any.
    ///
    /// A reply matches when its id is pending, it comes from the address the
    /// request was sent to, and its type is the expected one or `Ack`.
    pub fn complete(&self, reply: Reply) -> Completion {
        let seq = {
            let Some(entry) = self.pending.get(&reply.request_id) else {
                return Completion::Unmatched(reply, Unmatched::UnknownId);
            };
            if entry.target != reply.from {
                let expected = entry.target;
                return Completion::Unmatched(reply, Unmatched::WrongPeer { expected });
            }
            let received = reply.message_type();
            if received != entry.expected && received != MessageType::Ack {
                let expected = entry.expected;
                return Completion::Unmatched(reply, Unmatched::WrongType { expected });
            }
            entry.seq
        };

        let Some((_, pending)) = self
            .pending
            .remove_if(&reply.request_id, |_, p| p.seq == seq)
        else {
            // Released between the lookup and the removal.
            return Completion::Unmatched(reply, Unmatched::UnknownId);
        };

        let request_id = reply.request_id;
        let response_time = pending.created_at.elapsed();
        match pending.sender.send(Resolution::Reply(reply)) {
            Ok(()) => {
                self.stats.total_completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    request_id,
                    request_type = %pending.request_type,
                    response_time_ms = response_time.as_millis() as u64,
                    "Completed pending request"
                );
                Completion::Delivered
            }
            Err(_) => {
                self.stats.total_cancelled.fetch_add(1, Ordering::Relaxed);
                debug!(request_id, "Pending request receiver dropped");
                Completion::Abandoned
            }
        }
    }

    /// Fail every waiting caller with `Resolution::Closed`.
    ///
    /// Returns the number of callers released.
    pub fn fail_all(&self) -> usize {
        let ids: Vec<RequestId> = self.pending.iter().map(|e| *e.key()).collect();
        let mut released = 0;
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                // A dropped receiver already gave up; nothing to tell it.
                let _ = pending.sender.send(Resolution::Closed);
                self.stats.total_closed.fetch_add(1, Ordering::Relaxed);
                released += 1;
            }
        }
        released
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_pending(&self, request_id: RequestId) -> bool {
        self.pending.contains_key(&request_id)
    }

    #[must_use]
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }

    fn release(&self, request_id: RequestId, seq: u64, counter: &AtomicU64) -> bool {
        let removed = self
            .pending
            .remove_if(&request_id, |_, p| p.seq == seq)
            .is_some();
        if removed {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }
}

/// A caller's registration. Dropping it releases the id.
pub struct PendingGuard {
    store: Arc<PendingRequestStore>,
    request_id: RequestId,
    seq: u64,
    rx: Option<oneshot::Receiver<Resolution>>,
    released: bool,
}

impl PendingGuard {
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Wait for the reply. Cancel-safe: dropping the future keeps the guard
    /// usable.
    pub async fn wait(&mut self) -> Resolution {
        let Some(rx) = self.rx.as_mut() else {
            return Resolution::Closed;
        };
        let resolution = match rx.await {
            Ok(resolution) => resolution,
            Err(_) => Resolution::Closed,
        };
        self.rx = None;
        resolution
    }

    /// Release after the caller's deadline passed.
    pub fn expire(mut self, waited: Duration) {
        let store = Arc::clone(&self.store);
        if store.release(self.request_id, self.seq, &store.stats.total_timeouts) {
            debug!(
                request_id = self.request_id,
                waited_ms = waited.as_millis() as u64,
                "Pending request timed out"
            );
        }
        self.released = true;
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if !self.released {
            let store = Arc::clone(&self.store);
            store.release(self.request_id, self.seq, &store.stats.total_cancelled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctrl_types::{Ack, HpSegReply, IfId};

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 1], port))
    }

    fn ia() -> IsdAs {
        "1-ff00:0:110".parse().unwrap()
    }

    fn reply(id: RequestId, from: SocketAddr, payload: Payload) -> Reply {
        Reply {
            request_id: id,
            from,
            issuer: ia(),
            payload,
        }
    }

    fn store() -> Arc<PendingRequestStore> {
        Arc::new(PendingRequestStore::new())
    }

    #[tokio::test]
    async fn test_register_and_complete() {
        let store = store();
        let mut guard = store
            .register(7, peer(1), MessageType::HpSegRequest, MessageType::HpSegReply)
            .unwrap();
        assert!(store.is_pending(7));

        let payload = Payload::HpSegReply(HpSegReply { recs: vec![] });
        assert!(matches!(
            store.complete(reply(7, peer(1), payload.clone())),
            Completion::Delivered
        ));

        match guard.wait().await {
            Resolution::Reply(r) => assert_eq!(r.payload, payload),
            Resolution::Closed => panic!("expected reply"),
        }
        assert_eq!(store.pending_count(), 0);
        assert_eq!(store.stats().snapshot().completed, 1);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = store();
        let _guard = store
            .register(1, peer(1), MessageType::IfId, MessageType::Ack)
            .unwrap();
        assert!(matches!(
            store.register(1, peer(2), MessageType::IfId, MessageType::Ack),
            Err(MessengerError::DuplicateRequestId(1))
        ));
    }

    #[tokio::test]
    async fn test_reply_from_wrong_peer_unmatched() {
        let store = store();
        let _guard = store
            .register(3, peer(1), MessageType::HpCfgRequest, MessageType::HpCfgReply)
            .unwrap();

        let outcome = store.complete(reply(3, peer(2), Payload::Ack(Ack::ok())));
        assert!(matches!(
            outcome,
            Completion::Unmatched(_, Unmatched::WrongPeer { expected }) if expected == peer(1)
        ));
        assert!(store.is_pending(3));
    }

    #[tokio::test]
    async fn test_reply_of_wrong_type_unmatched() {
        let store = store();
        let _guard = store
            .register(3, peer(1), MessageType::HpSegRequest, MessageType::HpSegReply)
            .unwrap();

        let outcome = store.complete(reply(3, peer(1), Payload::IfId(IfId { orig_if: 1 })));
        assert!(matches!(
            outcome,
            Completion::Unmatched(
                _,
                Unmatched::WrongType {
                    expected: MessageType::HpSegReply
                }
            )
        ));
    }

    #[tokio::test]
    async fn test_ack_accepted_in_place_of_expected() {
        let store = store();
        let mut guard = store
            .register(5, peer(1), MessageType::HpSegRequest, MessageType::HpSegReply)
            .unwrap();
        let outcome = store.complete(reply(5, peer(1), Payload::Ack(Ack::reject("nope"))));
        assert!(matches!(outcome, Completion::Delivered));
        assert!(matches!(guard.wait().await, Resolution::Reply(_)));
    }

    #[tokio::test]
    async fn test_unknown_id_returns_reply() {
        let store = store();
        let payload = Payload::Ack(Ack::ok());
        match store.complete(reply(99, peer(1), payload.clone())) {
            Completion::Unmatched(r, Unmatched::UnknownId) => assert_eq!(r.payload, payload),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_drop_releases_entry() {
        let store = store();
        let guard = store
            .register(11, peer(1), MessageType::IfId, MessageType::Ack)
            .unwrap();
        drop(guard);
        assert!(!store.is_pending(11));
        assert_eq!(store.stats().snapshot().cancelled, 1);

        // The id is free again.
        let _again = store
            .register(11, peer(1), MessageType::IfId, MessageType::Ack)
            .unwrap();
    }

    #[tokio::test]
    async fn test_stale_guard_does_not_release_new_registration() {
        let store = store();
        let mut first = store
            .register(4, peer(1), MessageType::IfId, MessageType::Ack)
            .unwrap();
        store.complete(reply(4, peer(1), Payload::Ack(Ack::ok())));
        assert!(matches!(first.wait().await, Resolution::Reply(_)));

        let _second = store
            .register(4, peer(1), MessageType::IfId, MessageType::Ack)
            .unwrap();
        drop(first);
        assert!(store.is_pending(4));
    }

    #[tokio::test]
    async fn test_expire_counts_timeout() {
        let store = store();
        let guard = store
            .register(8, peer(1), MessageType::IfId, MessageType::Ack)
            .unwrap();
        guard.expire(Duration::from_millis(5));

        let stats = store.stats().snapshot();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.cancelled, 0);
        assert_eq!(store.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_fail_all_resolves_closed() {
        let store = store();
        let mut a = store
            .register(1, peer(1), MessageType::IfId, MessageType::Ack)
            .unwrap();
        let mut b = store
            .register(2, peer(2), MessageType::HpCfgRequest, MessageType::HpCfgReply)
            .unwrap();

        assert_eq!(store.fail_all(), 2);
        assert!(matches!(a.wait().await, Resolution::Closed));
        assert!(matches!(b.wait().await, Resolution::Closed));
        assert_eq!(store.pending_count(), 0);
        assert_eq!(store.stats().snapshot().closed, 2);
    }
}
