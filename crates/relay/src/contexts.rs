//! Registry of live page contexts.
//!
//! Each relay connection registers one context and receives its pushed socket
//! events through an unbounded channel. Unregistering drops the sender, so a
//! late event for a torn-down context surfaces as `PeerUnreachable`.

use crate::error::{RelayError, RelayResult};
use crate::metrics;
use crate::traits::EventSink;
use burner_core::protocol::{ContextId, SocketEvent};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

/// Maps context ids to their event channels.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    senders: Mutex<HashMap<ContextId, mpsc::UnboundedSender<SocketEvent>>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn senders(&self) -> MutexGuard<'_, HashMap<ContextId, mpsc::UnboundedSender<SocketEvent>>> {
        self.senders.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Context registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Register `context`, replacing any previous channel under the same id.
    pub fn register(&self, context: ContextId) -> mpsc::UnboundedReceiver<SocketEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let replaced = self.senders().insert(context.clone(), tx).is_some();
        if replaced {
            tracing::debug!(context = %context, "Page context re-registered");
        } else {
            metrics::PAGE_CONTEXTS.inc();
            tracing::debug!(context = %context, "Page context registered");
        }
        rx
    }

    /// Returns whether the context was registered.
    pub fn unregister(&self, context: &ContextId) -> bool {
        let removed = self.senders().remove(context).is_some();
        if removed {
            metrics::PAGE_CONTEXTS.dec();
            tracing::debug!(context = %context, "Page context unregistered");
        }
        removed
    }

    pub fn contains(&self, context: &ContextId) -> bool {
        self.senders().contains_key(context)
    }

    pub fn len(&self) -> usize {
        self.senders().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for ContextRegistry {
    fn deliver(&self, context: &ContextId, event: SocketEvent) -> RelayResult<()> {
        let senders = self.senders();
        let Some(tx) = senders.get(context) else {
            return Err(RelayError::PeerUnreachable(context.to_string()));
        };
        tx.send(event)
            .map_err(|_| RelayError::PeerUnreachable(context.to_string()))
    }

    fn is_reachable(&self, context: &ContextId) -> bool {
        self.senders()
            .get(context)
            .is_some_and(|tx| !tx.is_closed())
    }
}
