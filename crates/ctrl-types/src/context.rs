//! # Execution Context
//!
//! A boundable, cancellable context passed to every outbound call.
//!
//! A `Context` carries an optional deadline and any number of cancellation
//! signals inherited from its parents. Deriving a child never extends the
//! parent's deadline, and cancelling a parent cancels every child.

use crate::errors::ContextError;
use futures::future::{self, Future};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Execution context for a suspendable operation.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Vec<watch::Receiver<bool>>,
}

/// Cancels the context it was created with, and all contexts derived from it.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Cancel the associated context. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a child that expires after `timeout`, or at the parent's
    /// deadline if that comes first.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child that expires at `deadline`, or at the parent's
    /// deadline if that comes first.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        Self {
            deadline: Some(deadline),
            cancel: self.cancel.clone(),
        }
    }

    /// Derive a child with its own cancellation handle.
    #[must_use]
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let mut cancel = self.cancel.clone();
        cancel.push(rx);
        (
            Self {
                deadline: self.deadline,
                cancel,
            },
            CancelHandle { tx: Arc::new(tx) },
        )
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Non-blocking check: why the context is finished, if it is.
    #[must_use]
    pub fn err(&self) -> Option<ContextError> {
        if self.cancel.iter().any(|rx| *rx.borrow()) {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        if let Some(err) = self.err() {
            return err;
        }

        let cancelled = async {
            if self.cancel.is_empty() {
                return future::pending::<()>().await;
            }
            let waits = self.cancel.iter().cloned().map(|mut rx| {
                Box::pin(async move {
                    loop {
                        if *rx.borrow_and_update() {
                            return;
                        }
                        if rx.changed().await.is_err() {
                            if *rx.borrow() {
                                return;
                            }
                            // Handle dropped without cancelling.
                            future::pending::<()>().await;
                        }
                    }
                })
            });
            future::select_all(waits).await;
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                () = cancelled => ContextError::Cancelled,
                () = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                cancelled.await;
                ContextError::Cancelled
            }
        }
    }

    /// Drive `fut` to completion unless the context finishes first.
    ///
    /// # Errors
    ///
    /// Returns the `ContextError` if the context finished before `fut`.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ContextError> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            out = fut => Ok(out),
            err = self.done() => Err(err),
        }
    }
}
