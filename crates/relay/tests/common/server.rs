//! Relay test harness.

use super::fixtures::{START_MS, test_config};
use super::mocks::{FlakyStore, MockConnector, MockFetcher, MockPeer, RecordingNotifier, ScriptedRuleSink};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use burner_core::clock::ManualClock;
use burner_core::config::AppConfig;
use burner_core::protocol::{Command, ContextId, Response};
use burner_relay::adapters::MemoryCookieJar;
use burner_relay::{AppState, Substrate, create_router};
use burner_storage::Stores;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;

/// A relay wired to mock collaborators.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestRelay {
    pub state: AppState,
    pub router: axum::Router,
    pub fetcher: Arc<MockFetcher>,
    pub sink: Arc<ScriptedRuleSink>,
    pub notifier: Arc<RecordingNotifier>,
    pub cookies: Arc<MemoryCookieJar>,
    pub clock: Arc<ManualClock>,
    pub synced: Arc<FlakyStore>,
    pub local: Arc<FlakyStore>,
    pub peers: mpsc::UnboundedReceiver<MockPeer>,
    pub connector: Arc<MockConnector>,
}

#[allow(dead_code)]
impl TestRelay {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let fetcher = Arc::new(MockFetcher::new());
        let sink = Arc::new(ScriptedRuleSink::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let cookies = Arc::new(MemoryCookieJar::new());
        let clock = Arc::new(ManualClock::new(START_MS));
        let synced = Arc::new(FlakyStore::new());
        let local = Arc::new(FlakyStore::new());
        let (connector, peers) = MockConnector::new();
        let connector = Arc::new(connector);

        let substrate = Substrate {
            fetcher: fetcher.clone(),
            cookies: cookies.clone(),
            notifier: notifier.clone(),
            rule_sink: sink.clone(),
            connector: connector.clone(),
            clock: clock.clone(),
        };
        let stores = Stores::new(synced.clone(), local.clone());
        let state = AppState::new(config, stores, substrate);
        let router = create_router(state.clone());

        Self {
            state,
            router,
            fetcher,
            sink,
            notifier,
            cookies,
            clock,
            synced,
            local,
            peers,
            connector,
        }
    }

    /// Dispatch `command` as `context`.
    pub async fn command(&self, context: &str, command: Command) -> Response {
        self.state
            .dispatcher
            .handle(command, &ContextId::from(context))
            .await
    }

    /// Send a request through the router and decode a JSON body.
    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        context: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(context) = context {
            builder = builder.header("x-burner-context", context);
        }
        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, json)
    }
}
