//! Narrow interfaces of the privileged substrate the relay drives.
//!
//! Default implementations live in [`crate::adapters`]; tests substitute
//! recording mocks.

use crate::error::RelayResult;
use async_trait::async_trait;
use burner_core::protocol::{ContextId, SocketEvent};
use burner_core::rules::RuleDiff;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// An outgoing HTTP request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    /// Send ambient credentials (cookies) with the request.
    pub credentials: bool,
    /// The fetch capability has no timeout of its own.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            credentials: false,
            timeout: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A fully read HTTP response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    /// Header names are lowercased.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Whether the content type announces a JSON body.
    pub fn is_json(&self) -> bool {
        self.content_type().is_some_and(|ct| {
            let mime = ct.split(';').next().unwrap_or_default().trim();
            mime.eq_ignore_ascii_case("application/json") || mime.ends_with("+json")
        })
    }
}

/// Network fetch capability.
///
/// Non-success statuses are returned as responses; only transport failures
/// are errors.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    async fn fetch(&self, request: HttpRequest) -> RelayResult<HttpResponse>;
}

/// Declarative rule-installation sink.
#[async_trait]
pub trait RuleSink: Send + Sync + 'static {
    /// Remove `diff.remove_rule_ids` and add `diff.add_rules` in one call.
    async fn update_rules(&self, diff: RuleDiff) -> RelayResult<()>;
}

/// A browser cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

/// Read-only view of the privileged cookie store.
#[async_trait]
pub trait CookieStore: Send + Sync + 'static {
    async fn get_all(&self, domain: &str) -> RelayResult<Vec<Cookie>>;
}

/// A user-visible toast.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub kind: String,
    pub icon: Option<String>,
    pub title: String,
    pub message: String,
}

/// Toast surface. Delivery is never guaranteed.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Show `notification`, returning its id.
    async fn create(&self, notification: &Notification) -> RelayResult<String>;
}

/// Frames written to a duplex connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkFrame {
    Text(String),
    Close {
        code: Option<u16>,
        reason: Option<String>,
    },
}

/// Events raised by a duplex connection, in the order it raises them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    Text(String),
    Binary(Vec<u8>),
    Error(String),
    /// Terminal. Nothing follows it.
    Closed { code: Option<u16>, reason: String },
}

/// An open duplex connection as a pair of channels.
#[derive(Debug)]
pub struct DuplexLink {
    pub outbound: mpsc::Sender<LinkFrame>,
    pub inbound: mpsc::Receiver<LinkEvent>,
}

/// Opens real-time connections on behalf of page contexts.
#[async_trait]
pub trait DuplexConnector: Send + Sync + 'static {
    /// Resolve once the connection is open.
    async fn connect(&self, url: &str) -> RelayResult<DuplexLink>;
}

/// Delivers asynchronous notifications to page contexts.
pub trait EventSink: Send + Sync + 'static {
    /// Fails with `PeerUnreachable` when the context is gone.
    fn deliver(&self, context: &ContextId, event: SocketEvent) -> RelayResult<()>;

    /// Whether `context` can currently receive events.
    fn is_reachable(&self, context: &ContextId) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(content_type: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            status_text: "OK".to_string(),
            headers: BTreeMap::from([("content-type".to_string(), content_type.to_string())]),
            body: "{}".to_string(),
        }
    }

    #[test]
    fn json_detection_ignores_parameters() {
        assert!(response("application/json; charset=utf-8").is_json());
        assert!(response("application/problem+json").is_json());
        assert!(!response("text/html").is_json());
        assert!(!response("text/plain; note=application/json").is_json());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let request = HttpRequest::get("https://bot-hosting.net").with_header("X-XSRF-TOKEN", "t");
        assert_eq!(request.header("x-xsrf-token"), Some("t"));
        assert_eq!(response("text/plain").header("Content-Type"), Some("text/plain"));
    }
}
