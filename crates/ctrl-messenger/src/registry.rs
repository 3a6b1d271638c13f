//! Message type -> handler routing table.

use crate::error::{MessengerError, Result};
use crate::handler::Handler;
use ctrl_types::MessageType;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Routing table consulted for every inbound request.
///
/// Registration is allowed while the messenger is serving. Each message type
/// takes at most one handler; a second registration fails.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<MessageType, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// `MessengerError::DuplicateHandler` if `message_type` already has one.
    pub fn register(&self, message_type: MessageType, handler: Arc<dyn Handler>) -> Result<()> {
        let mut handlers = self.handlers.write();
        if handlers.contains_key(&message_type) {
            return Err(MessengerError::DuplicateHandler(message_type));
        }
        handlers.insert(message_type, handler);
        info!(message_type = %message_type, "Registered handler");
        Ok(())
    }

    #[must_use]
    pub fn get(&self, message_type: MessageType) -> Option<Arc<dyn Handler>> {
        self.handlers.read().get(&message_type).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}
