//! # Control Node Runtime
//!
//! Owns one messenger bound to a UDP socket plus the keepalive emitter.
//!
//! ## Startup Sequence
//!
//! 1. Build the trust store (self plus configured peers)
//! 2. Bind the UDP transport
//! 3. Register inbound handlers
//! 4. Spawn the receive loop and the keepalive emitter
//!
//! Shutdown runs in reverse: the emitter stops, then the messenger closes and
//! the receive loop is joined.

use crate::config::NodeConfig;
use crate::handlers::{KeepaliveHandler, LivenessTable};
use ctrl_messenger::{Messenger, MessengerError, RequestIdAllocator, Result, Transport, UdpTransport};
use ctrl_types::{Context, IfId, MessageType};
use ctrl_verify::{HmacSigner, HmacVerifier, TrustStore};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A running control node.
pub struct ControlNode {
    messenger: Messenger,
    liveness: LivenessTable,
    shutdown_tx: watch::Sender<bool>,
    serve_task: Mutex<Option<JoinHandle<Result<()>>>>,
    keepalive_task: Mutex<Option<JoinHandle<()>>>,
}

impl ControlNode {
    /// Bind, register handlers and start serving.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be bound or the messenger configuration is
    /// invalid.
    pub async fn start(config: NodeConfig) -> Result<Self> {
        info!("===========================================");
        info!("  Control Node v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        let trust = TrustStore::new();
        trust.insert(config.local_ia, config.hmac_secret.to_vec());
        for (issuer, secret) in &config.trusted {
            trust.insert(*issuer, secret.clone());
        }
        info!(peers = trust.len(), "Trust store loaded");

        let transport: Arc<dyn Transport> =
            Arc::new(UdpTransport::bind(config.listen_addr).await?);
        let signer = Arc::new(HmacSigner::new(config.local_ia, config.hmac_secret.to_vec()));
        let verifier = Arc::new(HmacVerifier::new(trust, config.verifier));
        let messenger = Messenger::new(transport, signer, verifier, config.messenger.clone())?;

        let keepalive = KeepaliveHandler::new();
        let liveness = keepalive.table();
        messenger.add_handler(MessageType::IfId, Arc::new(keepalive))?;

        let server = messenger.clone();
        let serve_task = tokio::spawn(async move {
            let outcome = server.listen_and_serve().await;
            match &outcome {
                Err(MessengerError::Closed) | Ok(()) => {}
                Err(e) => error!("Receive loop stopped: {}", e),
            }
            outcome
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let keepalive_task = (!config.keepalive_peers.is_empty()).then(|| {
            tokio::spawn(emit_keepalives(
                messenger.clone(),
                config.keepalive_peers.clone(),
                config.keepalive_interval,
                shutdown_rx,
            ))
        });

        info!(
            issuer = %config.local_ia,
            addr = %messenger.local_addr(),
            keepalive_peers = config.keepalive_peers.len(),
            "Control node running"
        );

        Ok(Self {
            messenger,
            liveness,
            shutdown_tx,
            serve_task: Mutex::new(Some(serve_task)),
            keepalive_task: Mutex::new(keepalive_task),
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.messenger.local_addr()
    }

    #[must_use]
    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    /// Keepalives received so far, keyed by sender and interface.
    #[must_use]
    pub fn liveness(&self) -> LivenessTable {
        Arc::clone(&self.liveness)
    }

    /// Stop emitting, close the messenger and join the receive loop.
    ///
    /// # Errors
    ///
    /// Returns the messenger's teardown error, or the receive loop's error if
    /// it had already failed.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Initiating graceful shutdown...");
        self.shutdown_tx.send_replace(true);

        let keepalive = self.keepalive_task.lock().take();
        if let Some(task) = keepalive {
            if let Err(e) = task.await {
                warn!("Keepalive emitter ended abnormally: {}", e);
            }
        }

        let closed = self.messenger.close_server().await;

        let serve = self.serve_task.lock().take();
        let served = match serve {
            // The loop may not have started before close; it then reports Closed.
            Some(task) => match task.await {
                Ok(Err(MessengerError::Closed)) => Ok(()),
                Ok(outcome) => outcome,
                Err(e) => {
                    error!("Receive loop task failed: {}", e);
                    Ok(())
                }
            },
            None => Ok(()),
        };

        info!("Shutdown complete");
        closed.and(served)
    }
}

/// Send one `IfId` per peer every `interval`. Peer `n` is announced as
/// interface `n + 1`.
async fn emit_keepalives(
    messenger: Messenger,
    peers: Vec<SocketAddr>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let ids = RequestIdAllocator::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                debug!("Keepalive emitter stopping");
                return;
            }
            _ = ticker.tick() => {}
        }

        for (index, peer) in peers.iter().enumerate() {
            let ctx = Context::background().with_timeout(interval);
            let msg = IfId {
                orig_if: index as u64 + 1,
            };
            match messenger.send_if_id(&ctx, msg, *peer, ids.next_id()).await {
                Ok(()) => {}
                Err(MessengerError::Closed) => return,
                Err(e) => warn!(%peer, "Keepalive failed: {}", e),
            }
        }
    }
}
