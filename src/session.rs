//! Session registry: identity → live connection, last write wins.
//!
//! This is the only long-lived shared mutable state in the pipeline. It
//! lets a publish run triggered by a stateless request find the live
//! connection of the same user and stream progress to it. Absence of an
//! entry is a normal, non-error case, and `get` callers must tolerate a
//! stale connection by treating send failures as best-effort.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::contract::Connection;

/// Concurrency-safe mapping from authenticated identity to at most one
/// live connection. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<RwLock<HashMap<String, Arc<dyn Connection>>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `identity` to `conn`, replacing any previous connection.
    /// Repeated logins by the same identity keep only the latest one.
    pub fn set(&self, identity: impl Into<String>, conn: Arc<dyn Connection>) {
        let identity = identity.into();
        let replaced = self.inner.write().insert(identity.clone(), conn).is_some();
        debug!(identity = %identity, replaced, "session registered");
    }

    /// Look up the live connection for `identity`, if any.
    pub fn get(&self, identity: &str) -> Option<Arc<dyn Connection>> {
        self.inner.read().get(identity).cloned()
    }

    /// Drop the entry for `identity` if it still points at `conn`.
    /// Memory hygiene when a connection's read loop ends; a reconnect
    /// that already overwrote the entry is left untouched.
    pub fn remove_if_same(&self, identity: &str, conn: &Arc<dyn Connection>) -> bool {
        let mut map = self.inner.write();
        match map.get(identity) {
            Some(current) if Arc::ptr_eq(current, conn) => {
                map.remove(identity);
                debug!(identity, "session removed");
                true
            }
            _ => false,
        }
    }
}
