//! Socket proxy multiplexing duplex connections per page context.
//!
//! Connections are keyed by `(context, id)`. Each one moves through
//! `connecting -> open` and is removed from the map when it closes, whichever
//! side closes it. Removal and the `close` event happen under the same lock,
//! so the event fires exactly once and nothing is forwarded after it.

use crate::error::{RelayError, RelayResult};
use crate::metrics;
use crate::traits::{DuplexConnector, DuplexLink, EventSink, LinkEvent, LinkFrame};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use burner_core::protocol::{ContextId, SocketEvent, SocketOp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Close code used when a close request names none.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when a connection could not be established.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Lifecycle of a proxied connection. Closed connections leave the map.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketState {
    Connecting,
    Open,
}

type SocketKey = (ContextId, String);

struct Entry {
    generation: u64,
    state: SocketState,
    outbound: Option<mpsc::Sender<LinkFrame>>,
    task: JoinHandle<()>,
}

impl Entry {
    /// Ask the peer to close and stop pumping. Errors are ignored.
    fn teardown(self, code: u16, reason: &str) {
        if let Some(outbound) = &self.outbound {
            let _ = outbound.try_send(LinkFrame::Close {
                code: Some(code),
                reason: Some(reason.to_string()),
            });
        }
        self.task.abort();
    }
}

struct Shared {
    entries: Mutex<HashMap<SocketKey, Entry>>,
    events: Arc<dyn EventSink>,
}

impl Shared {
    fn entries(&self) -> MutexGuard<'_, HashMap<SocketKey, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Socket map lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn emit(&self, context: &ContextId, event: SocketEvent) {
        let kind = match &event {
            SocketEvent::Open { .. } => "open",
            SocketEvent::Message { .. } => "message",
            SocketEvent::Error { .. } => "error",
            SocketEvent::Close { .. } => "close",
        };
        if let Err(e) = self.events.deliver(context, event) {
            metrics::UNDELIVERED_EVENTS.with_label_values(&[kind]).inc();
            tracing::debug!(context = %context, event = kind, error = %e, "Socket event dropped");
        }
    }

    /// Forward `event` only while generation `generation` still owns `key`.
    fn emit_if_current(&self, key: &SocketKey, generation: u64, event: SocketEvent) -> bool {
        let entries = self.entries();
        match entries.get(key) {
            Some(entry) if entry.generation == generation => {
                self.emit(&key.0, event);
                true
            }
            _ => false,
        }
    }

    /// Move the entry to `open`. Fails if it was closed or replaced meanwhile.
    fn mark_open(
        &self,
        key: &SocketKey,
        generation: u64,
        outbound: mpsc::Sender<LinkFrame>,
    ) -> Result<(), mpsc::Sender<LinkFrame>> {
        let mut entries = self.entries();
        match entries.get_mut(key) {
            Some(entry) if entry.generation == generation => {
                entry.state = SocketState::Open;
                entry.outbound = Some(outbound);
                self.emit(&key.0, SocketEvent::Open { id: key.1.clone() });
                Ok(())
            }
            _ => Err(outbound),
        }
    }

    /// Remove the entry and emit `close`, unless another party already did.
    fn finish(&self, key: &SocketKey, generation: u64, closing: Vec<SocketEvent>) {
        let mut entries = self.entries();
        if !matches!(entries.get(key), Some(entry) if entry.generation == generation) {
            return;
        }
        entries.remove(key);
        metrics::OPEN_SOCKETS.dec();
        for event in closing {
            self.emit(&key.0, event);
        }
    }
}

/// Owns every proxied connection.
pub struct SocketProxy {
    shared: Arc<Shared>,
    connector: Arc<dyn DuplexConnector>,
    connect_timeout: Duration,
    next_generation: AtomicU64,
}

impl SocketProxy {
    pub fn new(
        connector: Arc<dyn DuplexConnector>,
        events: Arc<dyn EventSink>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(HashMap::new()),
                events,
            }),
            connector,
            connect_timeout,
            next_generation: AtomicU64::new(1),
        }
    }

    /// Run one socket operation for `context`.
    pub async fn handle(&self, context: &ContextId, op: SocketOp) -> RelayResult<()> {
        match op {
            SocketOp::Connect { id, url } => self.connect(context, &id, &url),
            SocketOp::Send { id, data } => self.send(context, &id, data).await,
            SocketOp::Close { id, code, reason } => {
                self.close(context, &id, code, reason.as_deref());
                Ok(())
            }
        }
    }

    /// Start connecting `(context, id)` to `url`.
    ///
    /// Returns as soon as the attempt is registered; `open` or `error` +
    /// `close` follow as events. An existing connection under the same key is
    /// torn down first without a `close` event. Contexts that cannot receive
    /// events are refused with `PeerUnreachable`, so every socket stays owned
    /// by a context whose teardown will close it.
    pub fn connect(&self, context: &ContextId, id: &str, url: &str) -> RelayResult<()> {
        if id.is_empty() {
            return Err(RelayError::InvalidRequest("socket id is empty".to_string()));
        }
        let key: SocketKey = (context.clone(), id.to_string());
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        // Checked under the map lock so a concurrent context teardown either
        // sees this entry or this check sees the context gone.
        let mut entries = self.shared.entries();
        if !self.shared.events.is_reachable(context) {
            return Err(RelayError::PeerUnreachable(context.to_string()));
        }
        if let Some(previous) = entries.remove(&key) {
            metrics::OPEN_SOCKETS.dec();
            tracing::debug!(context = %context, socket = %id, "Replacing existing socket");
            previous.teardown(NORMAL_CLOSURE, "replaced");
        }

        let task = tokio::spawn(pump(
            self.shared.clone(),
            self.connector.clone(),
            key.clone(),
            generation,
            url.to_string(),
            self.connect_timeout,
        ));
        entries.insert(
            key,
            Entry {
                generation,
                state: SocketState::Connecting,
                outbound: None,
                task,
            },
        );
        metrics::OPEN_SOCKETS.inc();
        tracing::info!(context = %context, socket = %id, url = %url, "Socket connecting");
        Ok(())
    }

    /// Send a text frame. Fails with `NotConnected` unless the socket is open.
    pub async fn send(&self, context: &ContextId, id: &str, data: String) -> RelayResult<()> {
        let outbound = {
            let entries = self.shared.entries();
            match entries.get(&(context.clone(), id.to_string())) {
                Some(Entry {
                    state: SocketState::Open,
                    outbound: Some(outbound),
                    ..
                }) => outbound.clone(),
                _ => return Err(RelayError::NotConnected(id.to_string())),
            }
        };
        outbound
            .send(LinkFrame::Text(data))
            .await
            .map_err(|_| RelayError::NotConnected(id.to_string()))
    }

    /// Close `(context, id)` and emit its `close` event. Closing an absent
    /// socket is a no-op.
    pub fn close(&self, context: &ContextId, id: &str, code: Option<u16>, reason: Option<&str>) {
        let key: SocketKey = (context.clone(), id.to_string());
        let mut entries = self.shared.entries();
        let Some(entry) = entries.remove(&key) else {
            return;
        };
        metrics::OPEN_SOCKETS.dec();

        let code = code.unwrap_or(NORMAL_CLOSURE);
        let reason = reason.unwrap_or_default();
        entry.teardown(code, reason);
        self.shared.emit(
            context,
            SocketEvent::Close {
                id: id.to_string(),
                code: Some(code),
                reason: reason.to_string(),
            },
        );
        tracing::info!(context = %context, socket = %id, code, "Socket closed by page");
    }

    /// Tear down every socket of a departed context. No events are emitted.
    pub fn close_context(&self, context: &ContextId) -> usize {
        let mut entries = self.shared.entries();
        let keys: Vec<SocketKey> = entries
            .keys()
            .filter(|(ctx, _)| ctx == context)
            .cloned()
            .collect();
        for key in &keys {
            if let Some(entry) = entries.remove(key) {
                metrics::OPEN_SOCKETS.dec();
                entry.teardown(NORMAL_CLOSURE, "context closed");
            }
        }
        if !keys.is_empty() {
            tracing::info!(context = %context, sockets = keys.len(), "Closed sockets of departed context");
        }
        keys.len()
    }

    pub fn state(&self, context: &ContextId, id: &str) -> Option<SocketState> {
        self.shared
            .entries()
            .get(&(context.clone(), id.to_string()))
            .map(|entry| entry.state)
    }

    pub fn len(&self) -> usize {
        self.shared.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for SocketProxy {
    fn drop(&mut self) {
        for (_, entry) in self.shared.entries().drain() {
            metrics::OPEN_SOCKETS.dec();
            entry.teardown(NORMAL_CLOSURE, "relay shutting down");
        }
    }
}

async fn pump(
    shared: Arc<Shared>,
    connector: Arc<dyn DuplexConnector>,
    key: SocketKey,
    generation: u64,
    url: String,
    connect_timeout: Duration,
) {
    let id = key.1.clone();
    let connected = tokio::time::timeout(connect_timeout, connector.connect(&url)).await;
    let DuplexLink {
        outbound,
        mut inbound,
    } = match connected {
        Ok(Ok(link)) => link,
        Ok(Err(e)) => {
            tracing::warn!(context = %key.0, socket = %id, error = %e, "Socket connect failed");
            shared.finish(&key, generation, connect_failure(&id, e.to_string()));
            return;
        }
        Err(_) => {
            tracing::warn!(context = %key.0, socket = %id, "Socket connect timed out");
            shared.finish(
                &key,
                generation,
                connect_failure(&id, "connect timed out".to_string()),
            );
            return;
        }
    };

    if let Err(outbound) = shared.mark_open(&key, generation, outbound) {
        let _ = outbound.try_send(LinkFrame::Close {
            code: Some(NORMAL_CLOSURE),
            reason: None,
        });
        return;
    }
    tracing::info!(context = %key.0, socket = %id, "Socket open");

    while let Some(event) = inbound.recv().await {
        let forwarded = match event {
            LinkEvent::Text(data) => SocketEvent::Message {
                id: id.clone(),
                data,
                binary: false,
            },
            LinkEvent::Binary(bytes) => SocketEvent::Message {
                id: id.clone(),
                data: BASE64.encode(bytes),
                binary: true,
            },
            LinkEvent::Error(message) => SocketEvent::Error {
                id: id.clone(),
                message,
            },
            LinkEvent::Closed { code, reason } => {
                tracing::info!(context = %key.0, socket = %id, code = ?code, "Socket closed by peer");
                shared.finish(
                    &key,
                    generation,
                    vec![SocketEvent::Close {
                        id: id.clone(),
                        code,
                        reason,
                    }],
                );
                return;
            }
        };
        if !shared.emit_if_current(&key, generation, forwarded) {
            return;
        }
    }

    shared.finish(
        &key,
        generation,
        vec![SocketEvent::Close {
            id,
            code: Some(ABNORMAL_CLOSURE),
            reason: String::new(),
        }],
    );
}

fn connect_failure(id: &str, message: String) -> Vec<SocketEvent> {
    vec![
        SocketEvent::Error {
            id: id.to_string(),
            message,
        },
        SocketEvent::Close {
            id: id.to_string(),
            code: Some(ABNORMAL_CLOSURE),
            reason: String::new(),
        },
    ]
}
