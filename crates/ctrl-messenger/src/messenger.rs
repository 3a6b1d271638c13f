//! # Messenger
//!
//! The dispatcher. One receive loop (`listen_and_serve`) runs concurrently
//! with any number of outbound calls and handler invocations.
//!
//! ## Inbound pipeline
//!
//! 1. Decode the envelope. Malformed input is dropped.
//! 2. Verify the signed message with the datagram's source address and the
//!    envelope's id and type as associated data. Failures are dropped.
//! 3. Decode the payload and check it against the envelope's type.
//! 4. Offer it to the pending-request store. A match resolves the waiting
//!    caller and stops here.
//! 5. Unmatched replies are dropped. Requests are routed to the handler
//!    registered for their type, or dropped if none is.
//!
//! Nothing in the pipeline stops the loop. Only a fatal transport error or
//! `close_server` does.
//!
//! ## Outbound calls
//!
//! Every call takes a `Context`; when it carries no deadline the configured
//! request timeout applies. Awaiting calls register a `PendingGuard` before
//! sending, so a reply racing the send is never lost, and the guard releases
//! the entry however the call ends.

use crate::config::MessengerConfig;
use crate::error::{MessengerError, Result};
use crate::handler::{Handler, HandlerResult, HandlerStatus, Request};
use crate::outbox::Outbox;
use crate::pending::{Completion, PendingRequestStore, PendingStats, Reply, Resolution};
use crate::registry::HandlerRegistry;
use crate::stats::{DispatchSnapshot, DispatchStats};
use crate::transport::{raised, Transport};
use crate::writer::ResponseWriter;
use ctrl_types::{
    codec, Ack, CancelHandle, Context, ContextError, Envelope, HpCfgReply, HpCfgReq, HpSegReg,
    HpSegReply, HpSegReq, IfId, MessageType, Payload, RequestId,
};
use ctrl_verify::{Signer, Verifier};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Request/reply dispatcher over a datagram transport.
///
/// Cloning yields another handle to the same messenger.
#[derive(Clone)]
pub struct Messenger {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    outbox: Arc<Outbox>,
    verifier: Arc<dyn Verifier>,
    registry: HandlerRegistry,
    pending: Arc<PendingRequestStore>,
    config: MessengerConfig,
    lifecycle: Lifecycle,
    inflight: Arc<InflightTracker>,
    /// Parent of every handler context; cancelled when the grace period ends.
    root_ctx: Context,
    root_cancel: CancelHandle,
    stats: DispatchStats,
}

struct Lifecycle {
    serving: AtomicBool,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
    drained: watch::Sender<bool>,
}

impl Messenger {
    /// Create a messenger. It does not receive until `listen_and_serve` runs.
    ///
    /// # Errors
    ///
    /// `MessengerError::Config` if `config` is invalid.
    pub fn new(
        transport: Arc<dyn Transport>,
        signer: Arc<dyn Signer>,
        verifier: Arc<dyn Verifier>,
        config: MessengerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let outbox = Arc::new(Outbox::new(
            signer,
            Arc::clone(&transport),
            config.max_message_size,
        ));
        let (root_ctx, root_cancel) = Context::background().with_cancel();
        let (shutdown, _) = watch::channel(false);
        let (drained, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                outbox,
                verifier,
                registry: HandlerRegistry::new(),
                pending: Arc::new(PendingRequestStore::new()),
                config,
                lifecycle: Lifecycle {
                    serving: AtomicBool::new(false),
                    closed: AtomicBool::new(false),
                    shutdown,
                    drained,
                },
                inflight: Arc::new(InflightTracker::default()),
                root_ctx,
                root_cancel,
                stats: DispatchStats::default(),
            }),
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.transport.local_addr()
    }

    #[must_use]
    pub fn config(&self) -> &MessengerConfig {
        &self.inner.config
    }

    /// Register the handler for inbound messages of `message_type`.
    ///
    /// Safe to call while serving.
    ///
    /// # Errors
    ///
    /// `MessengerError::DuplicateHandler` if the type already has a handler.
    pub fn add_handler(&self, message_type: MessageType, handler: Arc<dyn Handler>) -> Result<()> {
        self.inner.registry.register(message_type, handler)
    }

    /// Run the receive loop until `close_server` is called or the transport
    /// fails fatally.
    ///
    /// # Errors
    ///
    /// - `MessengerError::AlreadyServing` - another loop is running
    /// - `MessengerError::Closed` - the messenger was closed before serving
    /// - `MessengerError::Transport` - the transport failed while serving
    pub async fn listen_and_serve(&self) -> Result<()> {
        let lifecycle = &self.inner.lifecycle;
        if lifecycle.serving.swap(true, Ordering::SeqCst) {
            return Err(MessengerError::AlreadyServing);
        }
        if lifecycle.closed.load(Ordering::SeqCst) {
            lifecycle.drained.send_replace(true);
            return Err(MessengerError::Closed);
        }

        let mut shutdown = lifecycle.shutdown.subscribe();
        if self.inner.registry.is_empty() {
            warn!("Serving with no handlers registered; inbound requests will be dropped");
        }
        info!(
            local = %self.local_addr(),
            handlers = self.inner.registry.len(),
            "Messenger serving"
        );

        let result = loop {
            tokio::select! {
                biased;
                () = raised(&mut shutdown) => {
                    info!("Received shutdown signal");
                    break Ok(());
                }
                received = self.inner.transport.recv_from() => match received {
                    Ok((bytes, from)) => self.accept(bytes, from),
                    Err(err) if err.is_fatal() => {
                        if lifecycle.closed.load(Ordering::SeqCst) {
                            break Ok(());
                        }
                        error!(error = %err, "Transport failed; stopping receive loop");
                        break Err(MessengerError::Transport(err));
                    }
                    Err(err) => warn!(error = %err, "Transient receive error"),
                },
            }
        };

        if result.is_err() {
            // No loop is left to resolve them.
            let failed = self.inner.pending.fail_all();
            if failed > 0 {
                warn!(failed_pending = failed, "Failed pending requests after transport loss");
            }
        }
        self.drain().await;
        lifecycle.drained.send_replace(true);
        info!("Messenger stopped serving");
        result
    }

    /// Stop serving, wait for in-flight handlers up to the shutdown grace,
    /// fail outstanding calls with `Closed` and release the transport.
    ///
    /// A second call returns `Ok(())` without touching anything.
    ///
    /// # Errors
    ///
    /// `MessengerError::Transport` if releasing the transport failed.
    pub async fn close_server(&self) -> Result<()> {
        let lifecycle = &self.inner.lifecycle;
        if lifecycle.closed.swap(true, Ordering::SeqCst) {
            debug!("Messenger already closed");
            return Ok(());
        }
        info!("Closing messenger");
        lifecycle.shutdown.send_replace(true);

        if lifecycle.serving.load(Ordering::SeqCst) {
            let mut drained = lifecycle.drained.subscribe();
            // The loop owns the grace period; this returns once it has drained.
            raised(&mut drained).await;
        }

        let failed = self.inner.pending.fail_all();
        let released = self.inner.transport.close().await;
        info!(failed_pending = failed, "Messenger closed");
        released.map_err(MessengerError::from)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lifecycle.closed.load(Ordering::SeqCst)
    }

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    /// Send `payload` to `to` and wait for the reply correlated to `id`.
    ///
    /// The reply is accepted if it comes from `to` and has type `expected`
    /// or `Ack`.
    ///
    /// # Errors
    ///
    /// - `MessengerError::DuplicateRequestId` - `id` is already pending
    /// - `MessengerError::Timeout` / `Cancelled` - the context ended first
    /// - `MessengerError::Closed` - the messenger closed while waiting
    /// - transport, codec or signing errors from the send
    pub async fn request(
        &self,
        ctx: &Context,
        payload: Payload,
        to: SocketAddr,
        id: RequestId,
        expected: MessageType,
    ) -> Result<Reply> {
        self.ensure_open()?;
        let ctx = self.bounded(ctx);
        let request_type = payload.message_type();
        let mut guard = self
            .inner
            .pending
            .register(id, to, request_type, expected)?;
        let started = Instant::now();

        self.inner.outbox.send(&ctx, &payload, to, id).await?;
        debug!(
            request_id = id,
            message_type = %request_type,
            to = %to,
            "Sent request"
        );

        let outcome = ctx.run(guard.wait()).await;
        match outcome {
            Ok(Resolution::Reply(reply)) => {
                debug!(
                    request_id = id,
                    message_type = %reply.message_type(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Received reply"
                );
                Ok(reply)
            }
            Ok(Resolution::Closed) => Err(MessengerError::Closed),
            Err(ContextError::DeadlineExceeded) => {
                guard.expire(started.elapsed());
                warn!(request_id = id, to = %to, "Request timed out");
                Err(MessengerError::Timeout { request_id: id })
            }
            Err(err) => {
                debug!(request_id = id, "Request cancelled");
                Err(MessengerError::from_context(err, id))
            }
        }
    }

    /// Send `payload` to `to` without waiting for a reply.
    ///
    /// # Errors
    ///
    /// Transport, codec, signing or context errors from the send.
    pub async fn send(
        &self,
        ctx: &Context,
        payload: Payload,
        to: SocketAddr,
        id: RequestId,
    ) -> Result<()> {
        self.ensure_open()?;
        let ctx = self.bounded(ctx);
        self.inner.outbox.send(&ctx, &payload, to, id).await?;
        debug!(
            request_id = id,
            message_type = %payload.message_type(),
            to = %to,
            "Sent message"
        );
        Ok(())
    }

    pub async fn send_if_id(
        &self,
        ctx: &Context,
        msg: IfId,
        to: SocketAddr,
        id: RequestId,
    ) -> Result<()> {
        self.send(ctx, msg.into(), to, id).await
    }

    pub async fn send_ack(&self, ctx: &Context, ack: Ack, to: SocketAddr, id: RequestId) -> Result<()> {
        self.send(ctx, ack.into(), to, id).await
    }

    /// Request hidden-path segments from a registry.
    pub async fn get_hp_segs(
        &self,
        ctx: &Context,
        req: HpSegReq,
        to: SocketAddr,
        id: RequestId,
    ) -> Result<HpSegReply> {
        let expected = MessageType::HpSegReply;
        let reply = self.request(ctx, req.into(), to, id, expected).await?;
        match reply.payload {
            Payload::HpSegReply(segs) => Ok(segs),
            other => Err(unexpected_reply(id, expected, other)),
        }
    }

    /// Request hidden-path group configurations.
    pub async fn get_hp_cfgs(
        &self,
        ctx: &Context,
        req: HpCfgReq,
        to: SocketAddr,
        id: RequestId,
    ) -> Result<HpCfgReply> {
        let expected = MessageType::HpCfgReply;
        let reply = self.request(ctx, req.into(), to, id, expected).await?;
        match reply.payload {
            Payload::HpCfgReply(cfgs) => Ok(cfgs),
            other => Err(unexpected_reply(id, expected, other)),
        }
    }

    pub async fn send_hp_seg_reply(
        &self,
        ctx: &Context,
        reply: HpSegReply,
        to: SocketAddr,
        id: RequestId,
    ) -> Result<()> {
        self.send(ctx, reply.into(), to, id).await
    }

    pub async fn send_hp_cfg_reply(
        &self,
        ctx: &Context,
        reply: HpCfgReply,
        to: SocketAddr,
        id: RequestId,
    ) -> Result<()> {
        self.send(ctx, reply.into(), to, id).await
    }

    /// Register hidden-path segments and wait for the registry's `Ack`.
    ///
    /// # Errors
    ///
    /// `MessengerError::Rejected` unless the ack is `Ok`.
    pub async fn send_hp_seg_reg(
        &self,
        ctx: &Context,
        reg: HpSegReg,
        to: SocketAddr,
        id: RequestId,
    ) -> Result<()> {
        let expected = MessageType::Ack;
        let reply = self.request(ctx, reg.into(), to, id, expected).await?;
        match reply.payload {
            Payload::Ack(ack) if ack.is_ok() => Ok(()),
            other => Err(unexpected_reply(id, expected, other)),
        }
    }

    // =========================================================================
    // OBSERVABILITY
    // =========================================================================

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.pending_count()
    }

    #[must_use]
    pub fn pending_stats(&self) -> &PendingStats {
        self.inner.pending.stats()
    }

    #[must_use]
    pub fn dispatch_stats(&self) -> DispatchSnapshot {
        self.inner.stats.snapshot()
    }

    /// Number of inbound messages still being processed.
    #[must_use]
    pub fn inflight(&self) -> usize {
        self.inner.inflight.count()
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(MessengerError::Closed);
        }
        Ok(())
    }

    fn bounded(&self, ctx: &Context) -> Context {
        match ctx.deadline() {
            Some(_) => ctx.clone(),
            None => ctx.with_timeout(self.inner.config.request_timeout),
        }
    }

    fn accept(&self, bytes: Vec<u8>, from: SocketAddr) {
        let inner = Arc::clone(&self.inner);
        let token = self.inner.inflight.enter();
        tokio::spawn(async move {
            let _token = token;
            inner.process(bytes, from).await;
        });
    }

    async fn drain(&self) {
        let grace = self.inner.config.shutdown_grace;
        let idle = self.inner.inflight.wait_idle();
        if tokio::time::timeout(grace, idle).await.is_err() {
            warn!(
                inflight = self.inner.inflight.count(),
                grace_ms = grace.as_millis() as u64,
                "Shutdown grace elapsed; aborting in-flight handlers"
            );
            self.inner.root_cancel.cancel();
            // Cancelled tasks exit at their next await; the transport stays up until then.
            self.inner.inflight.wait_idle().await;
        }
    }
}

impl Inner {
    async fn process(self: Arc<Self>, bytes: Vec<u8>, from: SocketAddr) {
        DispatchStats::bump(&self.stats.received);

        let envelope = match Envelope::from_bytes(&bytes, self.config.max_message_size) {
            Ok(envelope) => envelope,
            Err(err) => {
                DispatchStats::bump(&self.stats.dropped_malformed);
                warn!(from = %from, error = %err, "Dropping malformed envelope");
                return;
            }
        };
        let Envelope {
            message_type,
            request_id,
            signed,
            ..
        } = envelope;

        let ctx = self.root_ctx.with_timeout(self.config.handler_timeout);
        let aad = Envelope::associated_data(message_type, request_id);
        let verified = match self
            .verifier
            .verify(&ctx, &signed, Some(from), &[&aad[..]])
            .await
        {
            Ok(verified) => verified,
            Err(err) => {
                DispatchStats::bump(&self.stats.dropped_unverified);
                warn!(
                    request_id,
                    message_type = %message_type,
                    from = %from,
                    reason = %err,
                    "Dropping unverified message"
                );
                return;
            }
        };

        let payload = match codec::decode_payload(&verified.body) {
            Ok(payload) if payload.message_type() == message_type => payload,
            Ok(payload) => {
                DispatchStats::bump(&self.stats.dropped_malformed);
                warn!(
                    request_id,
                    message_type = %message_type,
                    payload_type = %payload.message_type(),
                    from = %from,
                    "Dropping message whose payload does not match its type"
                );
                return;
            }
            Err(err) => {
                DispatchStats::bump(&self.stats.dropped_malformed);
                warn!(request_id, from = %from, error = %err, "Dropping undecodable payload");
                return;
            }
        };

        let reply = Reply {
            request_id,
            from,
            issuer: verified.issuer(),
            payload,
        };
        let request = match self.pending.complete(reply) {
            Completion::Delivered => {
                DispatchStats::bump(&self.stats.replies_correlated);
                return;
            }
            Completion::Abandoned => {
                DispatchStats::bump(&self.stats.replies_abandoned);
                debug!(request_id, from = %from, "Reply arrived after caller stopped waiting");
                return;
            }
            Completion::Unmatched(reply, reason) => {
                if message_type.is_reply() {
                    DispatchStats::bump(&self.stats.dropped_unmatched);
                    warn!(
                        request_id,
                        message_type = %message_type,
                        from = %from,
                        reason = ?reason,
                        "Dropping reply with no matching request"
                    );
                    return;
                }
                reply
            }
        };

        self.dispatch(ctx, request).await;
    }

    async fn dispatch(&self, ctx: Context, inbound: Reply) {
        let Reply {
            request_id,
            from,
            issuer,
            payload,
        } = inbound;
        let message_type = payload.message_type();

        let Some(handler) = self.registry.get(message_type) else {
            DispatchStats::bump(&self.stats.dropped_unroutable);
            warn!(
                request_id,
                message_type = %message_type,
                from = %from,
                "No handler registered; dropping request"
            );
            return;
        };
        DispatchStats::bump(&self.stats.dispatched);
        debug!(
            request_id,
            message_type = %message_type,
            from = %from,
            issuer = %issuer,
            "Dispatching request"
        );

        let replied = Arc::new(AtomicBool::new(false));
        let writer = ResponseWriter::new(
            Arc::clone(&self.outbox),
            from,
            request_id,
            Arc::clone(&replied),
        );
        let request = Request::new(payload, from, request_id, issuer).with_writer(ctx.clone(), writer);

        // Own task, so a panic surfaces as a JoinError instead of unwinding here.
        let mut invocation = tokio::spawn(async move { handler.handle(request).await });
        let result = match ctx.run(&mut invocation).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) if join.is_panic() => HandlerResult::internal_error("handler panicked"),
            Ok(Err(_)) => HandlerResult::internal_error("handler task cancelled"),
            Err(err) => {
                invocation.abort();
                // Joined so the in-flight count covers the handler until it really stops.
                let _ = invocation.await;
                HandlerResult::internal_error(format!("handler aborted: {err}"))
            }
        };

        self.finish(result, from, request_id, message_type, replied)
            .await;
    }

    async fn finish(
        &self,
        result: HandlerResult,
        from: SocketAddr,
        request_id: RequestId,
        message_type: MessageType,
        replied: Arc<AtomicBool>,
    ) {
        let reason = result.reason.as_deref().unwrap_or("");
        match result.status {
            HandlerStatus::Ok => {
                debug!(request_id, message_type = %message_type, "Handler succeeded");
            }
            HandlerStatus::ClientError | HandlerStatus::ServerError => {
                warn!(
                    request_id,
                    message_type = %message_type,
                    from = %from,
                    status = ?result.status,
                    reason,
                    "Handler returned error"
                );
            }
            HandlerStatus::InternalError => {
                DispatchStats::bump(&self.stats.handler_internal_errors);
                error!(
                    request_id,
                    message_type = %message_type,
                    from = %from,
                    reason,
                    "Handler failed internally"
                );
            }
        }

        let Some(ack) = result.automatic_ack() else {
            return;
        };
        if replied.load(Ordering::Acquire) {
            debug!(request_id, "Handler replied itself; skipping automatic ack");
            return;
        }

        // The handler's own context may have run out; the ack gets a fresh budget.
        let ctx = self.root_ctx.with_timeout(self.config.handler_timeout);
        let writer = ResponseWriter::new(Arc::clone(&self.outbox), from, request_id, replied);
        match writer.send_ack_reply(&ctx, ack).await {
            Ok(()) => DispatchStats::bump(&self.stats.auto_replies),
            Err(MessengerError::AlreadyReplied { .. }) => {
                debug!(request_id, "Handler replied itself; skipping automatic ack");
            }
            Err(err) => {
                warn!(request_id, to = %from, error = %err, "Failed to send automatic ack");
            }
        }
    }
}

fn unexpected_reply(request_id: RequestId, expected: MessageType, payload: Payload) -> MessengerError {
    match payload {
        Payload::Ack(ack) if !ack.is_ok() => MessengerError::Rejected { request_id, ack },
        other => MessengerError::UnexpectedReply {
            request_id,
            expected,
            received: other.message_type(),
        },
    }
}

/// Counts inbound messages still being processed.
#[derive(Default)]
struct InflightTracker {
    count: AtomicUsize,
    idle: Notify,
}

impl InflightTracker {
    fn enter(self: &Arc<Self>) -> InflightToken {
        self.count.fetch_add(1, Ordering::AcqRel);
        InflightToken {
            tracker: Arc::clone(self),
        }
    }

    fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

struct InflightToken {
    tracker: Arc<InflightTracker>,
}

impl Drop for InflightToken {
    fn drop(&mut self) {
        if self.tracker.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}
