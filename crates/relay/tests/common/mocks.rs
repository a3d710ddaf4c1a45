//! Recording and scriptable stand-ins for the relay's collaborators.

use async_trait::async_trait;
use burner_core::protocol::{ContextId, SocketEvent};
use burner_core::rules::{Rule, RuleDiff};
use burner_relay::adapters::MemoryRuleSink;
use burner_relay::error::{RelayError, RelayResult};
use burner_relay::traits::{
    DuplexConnector, DuplexLink, EventSink, Fetcher, HttpRequest, HttpResponse, LinkEvent,
    LinkFrame, Notification, Notifier, RuleSink,
};
use burner_storage::{KeyValueStore, MemoryStore, StorageError, StorageResult};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// Fetcher answering from a route table keyed by URL without query string.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockFetcher {
    routes: Mutex<HashMap<String, Result<HttpResponse, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

#[allow(dead_code)]
impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, status: u16, body: &str) {
        self.respond_with(url, status, "text/plain", body);
    }

    pub fn respond_json(&self, url: &str, body: Value) {
        self.respond_with(url, 200, "application/json", &body.to_string());
    }

    pub fn respond_with(&self, url: &str, status: u16, content_type: &str, body: &str) {
        let response = HttpResponse {
            status,
            status_text: match status {
                200 => "OK",
                404 => "Not Found",
                500 => "Internal Server Error",
                503 => "Service Unavailable",
                _ => "",
            }
            .to_string(),
            headers: BTreeMap::from([("content-type".to_string(), content_type.to_string())]),
            body: body.to_string(),
        };
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(response));
    }

    /// Make requests to `url` fail at the transport level.
    pub fn fail(&self, url: &str, message: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(message.to_string()));
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests whose URL, query stripped, is `url`.
    pub fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| strip_query(&r.url) == url)
            .collect()
    }

    pub fn count(&self, url: &str) -> usize {
        self.requests_to(url).len()
    }
}

fn strip_query(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: HttpRequest) -> RelayResult<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let routes = self.routes.lock().unwrap();
        let route = routes
            .get(&request.url)
            .or_else(|| routes.get(strip_query(&request.url)));
        match route {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(message)) => Err(RelayError::FetchFailed(message.clone())),
            None => Err(RelayError::FetchFailed(format!("no route for {}", request.url))),
        }
    }
}

/// In-memory store whose reads and writes can be made to fail.
#[allow(dead_code)]
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

#[allow(dead_code)]
impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, keys: &[&str]) -> StorageResult<HashMap<String, Value>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Rejected("reads disabled".to_string()));
        }
        self.inner.get(keys).await
    }

    async fn set(&self, entries: HashMap<String, Value>) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Rejected("writes disabled".to_string()));
        }
        self.inner.set(entries).await
    }

    async fn remove(&self, keys: &[&str]) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Rejected("writes disabled".to_string()));
        }
        self.inner.remove(keys).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

/// Rule sink recording every diff, optionally rejecting them.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedRuleSink {
    pub installed: MemoryRuleSink,
    diffs: Mutex<Vec<RuleDiff>>,
    fail: AtomicBool,
}

#[allow(dead_code)]
impl ScriptedRuleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn diffs(&self) -> Vec<RuleDiff> {
        self.diffs.lock().unwrap().clone()
    }

    pub fn rules(&self) -> Vec<Rule> {
        self.installed.installed()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.installed.installed_ids()
    }
}

#[async_trait]
impl RuleSink for ScriptedRuleSink {
    async fn update_rules(&self, diff: RuleDiff) -> RelayResult<()> {
        self.diffs.lock().unwrap().push(diff.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(RelayError::RuleInstallFailed("sink rejected diff".to_string()));
        }
        self.installed.update_rules(diff).await
    }
}

/// Notifier that records attempts and can reject icons or everything.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingNotifier {
    attempts: Mutex<Vec<Notification>>,
    pub reject_icons: AtomicBool,
    pub reject_all: AtomicBool,
}

#[allow(dead_code)]
impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> Vec<Notification> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn create(&self, notification: &Notification) -> RelayResult<String> {
        let mut attempts = self.attempts.lock().unwrap();
        attempts.push(notification.clone());
        if self.reject_all.load(Ordering::SeqCst)
            || (self.reject_icons.load(Ordering::SeqCst) && notification.icon.is_some())
        {
            return Err(RelayError::Internal("notification rejected".to_string()));
        }
        Ok(format!("toast-{}", attempts.len()))
    }
}

/// The far end of a mock duplex connection.
#[allow(dead_code)]
pub struct MockPeer {
    pub url: String,
    pub events: mpsc::Sender<LinkEvent>,
    pub frames: mpsc::Receiver<LinkFrame>,
}

#[allow(dead_code)]
impl MockPeer {
    pub async fn raise(&self, event: LinkEvent) {
        self.events.send(event).await.unwrap();
    }

    /// Next frame written by the relay, if one arrives soon.
    pub async fn next_frame(&mut self) -> Option<LinkFrame> {
        tokio::time::timeout(Duration::from_secs(1), self.frames.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Connector handing the far end of every link to the test.
#[allow(dead_code)]
pub struct MockConnector {
    peers: mpsc::UnboundedSender<MockPeer>,
    refused: Mutex<HashSet<String>>,
    hanging: Mutex<HashSet<String>>,
    pub connects: AtomicUsize,
}

#[allow(dead_code)]
impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                peers: tx,
                refused: Mutex::new(HashSet::new()),
                hanging: Mutex::new(HashSet::new()),
                connects: AtomicUsize::new(0),
            },
            rx,
        )
    }

    pub fn refuse(&self, url: &str) {
        self.refused.lock().unwrap().insert(url.to_string());
    }

    /// Connections to `url` never finish opening.
    pub fn hang(&self, url: &str) {
        self.hanging.lock().unwrap().insert(url.to_string());
    }
}

#[async_trait]
impl DuplexConnector for MockConnector {
    async fn connect(&self, url: &str) -> RelayResult<DuplexLink> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refused.lock().unwrap().contains(url) {
            return Err(RelayError::FetchFailed(format!("connection to {url} refused")));
        }
        let hang = self.hanging.lock().unwrap().contains(url);
        if hang {
            std::future::pending::<()>().await;
        }

        let (frames_tx, frames_rx) = mpsc::channel(16);
        let (events_tx, events_rx) = mpsc::channel(16);
        let _ = self.peers.send(MockPeer {
            url: url.to_string(),
            events: events_tx,
            frames: frames_rx,
        });
        Ok(DuplexLink {
            outbound: frames_tx,
            inbound: events_rx,
        })
    }
}

/// Event sink recording deliveries; contexts marked gone are unreachable.
#[allow(dead_code)]
pub struct RecordingEventSink {
    tx: mpsc::UnboundedSender<(ContextId, SocketEvent)>,
    gone: Mutex<HashSet<ContextId>>,
    delivered: Mutex<Vec<(ContextId, SocketEvent)>>,
}

#[allow(dead_code)]
impl RecordingEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(ContextId, SocketEvent)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                gone: Mutex::new(HashSet::new()),
                delivered: Mutex::new(Vec::new()),
            },
            rx,
        )
    }

    pub fn mark_gone(&self, context: &ContextId) {
        self.gone.lock().unwrap().insert(context.clone());
    }

    pub fn delivered(&self) -> Vec<(ContextId, SocketEvent)> {
        self.delivered.lock().unwrap().clone()
    }
}

impl EventSink for RecordingEventSink {
    fn deliver(&self, context: &ContextId, event: SocketEvent) -> RelayResult<()> {
        if self.gone.lock().unwrap().contains(context) {
            return Err(RelayError::PeerUnreachable(context.to_string()));
        }
        self.delivered
            .lock()
            .unwrap()
            .push((context.clone(), event.clone()));
        let _ = self.tx.send((context.clone(), event));
        Ok(())
    }

    fn is_reachable(&self, context: &ContextId) -> bool {
        !self.gone.lock().unwrap().contains(context)
    }
}

/// Next event from a recording sink, failing the test if none arrives.
#[allow(dead_code)]
pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<(ContextId, SocketEvent)>) -> SocketEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for socket event")
        .expect("event channel closed")
        .1
}

/// Assert no event arrives within a short window.
#[allow(dead_code)]
pub async fn assert_no_event(rx: &mut mpsc::UnboundedReceiver<(ContextId, SocketEvent)>) {
    if let Ok(Some((_, event))) = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await
    {
        panic!("unexpected socket event: {event:?}");
    }
}
