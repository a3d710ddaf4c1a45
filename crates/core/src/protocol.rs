//! Command/response protocol between page contexts and the background relay.
//!
//! Every request is a [`Command`] tagged by its `action` field. Every command
//! gets exactly one [`Response`]; failures are reported in-band as
//! [`Failure`] so a caller awaiting a response never hangs.

use crate::cache_record::ExtensionUpdate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Identifies one sandboxed page context (one open page).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The closed command set understood by the relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    /// Flags plus cache/version state.
    GetStatus,
    SetEnabled {
        enabled: bool,
    },
    SetOverrideSource {
        enabled: bool,
    },
    SetQuicDisabled {
        disabled: bool,
    },
    /// Refresh the version marker and re-download the payload now.
    ForceUpdate,
    /// Compare the running package version against upstream metadata.
    CheckExtensionUpdate,
    /// The page reports its payload was injected.
    InjectionComplete,
    /// The injected payload reports it is running `version`.
    UpdateDetected {
        #[serde(default)]
        version: Option<String>,
    },
    SendNotification {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },
    ProxyFetch(ProxyFetchRequest),
    SocketAction(SocketOp),
}

impl Command {
    /// Stable label used for logging and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetStatus => "getStatus",
            Self::SetEnabled { .. } => "setEnabled",
            Self::SetOverrideSource { .. } => "setOverrideSource",
            Self::SetQuicDisabled { .. } => "setQuicDisabled",
            Self::ForceUpdate => "forceUpdate",
            Self::CheckExtensionUpdate => "checkExtensionUpdate",
            Self::InjectionComplete => "injectionComplete",
            Self::UpdateDetected { .. } => "updateDetected",
            Self::SendNotification { .. } => "sendNotification",
            Self::ProxyFetch(_) => "proxyFetch",
            Self::SocketAction(op) => match op {
                SocketOp::Connect { .. } => "socketAction:connect",
                SocketOp::Send { .. } => "socketAction:send",
                SocketOp::Close { .. } => "socketAction:close",
            },
        }
    }

    /// Whether replaying the command after an unknown outcome is harmless.
    pub fn is_retry_safe(&self) -> bool {
        !matches!(self, Self::SocketAction(SocketOp::Send { .. }))
    }
}

fn default_method() -> String {
    "GET".to_string()
}

/// A network request performed on behalf of a page context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyFetchRequest {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl ProxyFetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

/// Socket lifecycle operations, keyed by a caller-chosen identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum SocketOp {
    Connect {
        id: String,
        url: String,
    },
    /// Sends a text frame. Not safe to retry.
    Send {
        id: String,
        data: String,
    },
    Close {
        id: String,
        #[serde(default)]
        code: Option<u16>,
        #[serde(default)]
        reason: Option<String>,
    },
}

impl SocketOp {
    pub fn id(&self) -> &str {
        match self {
            Self::Connect { id, .. } | Self::Send { id, .. } | Self::Close { id, .. } => id,
        }
    }
}

/// Asynchronous socket notifications pushed to the originating context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SocketEvent {
    Open {
        id: String,
    },
    Message {
        id: String,
        data: String,
        /// `data` is base64 of a binary frame.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        binary: bool,
    },
    Error {
        id: String,
        message: String,
    },
    Close {
        id: String,
        #[serde(default)]
        code: Option<u16>,
        #[serde(default)]
        reason: String,
    },
}

impl SocketEvent {
    pub fn id(&self) -> &str {
        match self {
            Self::Open { id }
            | Self::Message { id, .. }
            | Self::Error { id, .. }
            | Self::Close { id, .. } => id,
        }
    }
}

/// Plain success acknowledgment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Structured failure; never a raw error trace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub success: bool,
    pub error: String,
    #[serde(default)]
    pub code: Option<String>,
}

impl Failure {
    pub fn new(error: impl Into<String>, code: Option<&str>) -> Self {
        Self {
            success: false,
            error: error.into(),
            code: code.map(str::to_string),
        }
    }
}

/// Response to `getStatus`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub enabled: bool,
    pub override_source_enabled: bool,
    pub quic_disabled: bool,
    pub script_version: Option<String>,
    pub latest_script_version: Option<String>,
    /// Epoch ms of the last successful refresh; `None` means never.
    pub last_updated: Option<i64>,
    pub update_available: bool,
    pub extension_update_available: ExtensionUpdate,
    pub package_version: String,
}

/// Response to `forceUpdate`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshReport {
    pub success: bool,
    pub update_available: bool,
    pub current_version: Option<String>,
    pub latest_version: String,
}

/// Response to `checkExtensionUpdate`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionUpdateReport {
    pub success: bool,
    pub package_version: String,
    pub extension_update_available: ExtensionUpdate,
}

/// Normalized response of a `proxyFetch`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyFetchResponse {
    pub success: bool,
    pub status: u16,
    pub ok: bool,
    pub status_text: String,
    /// Parsed JSON when the content type says so, otherwise a string.
    pub data: Value,
}

/// Any relay response. Serialized without a tag; variant order matters for
/// decoding since later variants accept supersets of earlier ones' shapes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Status(StatusReport),
    Refresh(RefreshReport),
    ExtensionUpdate(ExtensionUpdateReport),
    Fetch(ProxyFetchResponse),
    Failure(Failure),
    Ack(Ack),
}

impl Response {
    pub fn ack() -> Self {
        Self::Ack(Ack::ok())
    }

    pub fn failure(error: impl Into<String>, code: Option<&str>) -> Self {
        Self::Failure(Failure::new(error, code))
    }

    pub fn is_success(&self) -> bool {
        match self {
            Self::Status(_) => true,
            Self::Refresh(r) => r.success,
            Self::ExtensionUpdate(r) => r.success,
            Self::Fetch(r) => r.success,
            Self::Failure(_) => false,
            Self::Ack(a) => a.success,
        }
    }

    /// The failure message, if this is a failure.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failure(f) => Some(&f.error),
            _ => None,
        }
    }
}

/// A request frame on the relay socket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub id: u64,
    pub command: Command,
}

/// Frames the relay sends to a page context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelayFrame {
    Reply { id: u64, response: Response },
    Event { event: SocketEvent },
}
