//! Storage for the session token.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::SessionToken;

/// Holds at most one session token.
///
/// Implementations are a single slot without expiry: `set` overwrites
/// whatever is stored, the last write wins.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<SessionToken>;
    fn set(&self, token: SessionToken);
    fn clear(&self);
}

/// A process-lifetime [TokenStore].
///
/// Clones share the same slot, so one store can back several clients.
#[derive(Debug, Clone, Default)]
pub struct MemoryTokenStore {
    slot: Arc<Mutex<Option<SessionToken>>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<SessionToken>> {
        // the slot is only ever assigned whole, a poisoned lock still holds a
        // consistent value
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<SessionToken> {
        self.slot().clone()
    }

    fn set(&self, token: SessionToken) {
        *self.slot() = Some(token);
    }

    fn clear(&self) {
        *self.slot() = None;
    }
}
