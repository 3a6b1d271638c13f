//! # Trust Store
//!
//! Maps issuer identities to their shared signing secrets.

use ctrl_types::IsdAs;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Thread-safe issuer -> secret map. Cloning shares the underlying store.
#[derive(Debug, Clone, Default)]
pub struct TrustStore {
    keys: Arc<RwLock<HashMap<IsdAs, Arc<[u8]>>>>,
}

impl TrustStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust `issuer` with `secret`, replacing any previous secret.
    pub fn insert(&self, issuer: IsdAs, secret: impl Into<Vec<u8>>) {
        let secret: Vec<u8> = secret.into();
        self.keys.write().insert(issuer, Arc::from(secret));
    }

    /// Stop trusting `issuer`. Returns true if it was trusted.
    pub fn remove(&self, issuer: &IsdAs) -> bool {
        self.keys.write().remove(issuer).is_some()
    }

    #[must_use]
    pub fn get(&self, issuer: &IsdAs) -> Option<Arc<[u8]>> {
        self.keys.read().get(issuer).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.read().is_empty()
    }
}
