//! Cache and version bookkeeping persisted in the local namespace.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;

pub const SCRIPT_VERSION_KEY: &str = "scriptVersion";
pub const LATEST_SCRIPT_VERSION_KEY: &str = "latestScriptVersion";
pub const LAST_CHECK_TIMESTAMP_KEY: &str = "lastCheckTimestamp";
pub const UPDATE_AVAILABLE_KEY: &str = "updateAvailable";
pub const EXTENSION_UPDATE_AVAILABLE_KEY: &str = "extensionUpdateAvailable";
/// The cached payload body itself.
pub const SCRIPT_PAYLOAD_KEY: &str = "scriptPayload";

/// Keys read when loading a [`CacheRecord`].
pub const RECORD_KEYS: [&str; 5] = [
    SCRIPT_VERSION_KEY,
    LATEST_SCRIPT_VERSION_KEY,
    LAST_CHECK_TIMESTAMP_KEY,
    UPDATE_AVAILABLE_KEY,
    EXTENSION_UPDATE_AVAILABLE_KEY,
];

/// Newer package version advertised upstream, if any.
///
/// On the wire this is either the version string or `false`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtensionUpdate(pub Option<String>);

impl ExtensionUpdate {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn available(version: impl Into<String>) -> Self {
        Self(Some(version.into()))
    }

    pub fn is_available(&self) -> bool {
        self.0.is_some()
    }

    pub fn to_value(&self) -> Value {
        match &self.0 {
            Some(v) => Value::String(v.clone()),
            None => Value::Bool(false),
        }
    }

    pub fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::String(s)) if !s.is_empty() => Self(Some(s.clone())),
            _ => Self(None),
        }
    }
}

impl Serialize for ExtensionUpdate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.0 {
            Some(v) => serializer.serialize_str(v),
            None => serializer.serialize_bool(false),
        }
    }
}

impl<'de> Deserialize<'de> for ExtensionUpdate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(Some(&value)))
    }
}

/// Snapshot of the local cache bookkeeping.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheRecord {
    pub script_version: Option<String>,
    pub latest_script_version: Option<String>,
    /// Epoch milliseconds of the last successful refresh.
    pub last_check_timestamp: Option<i64>,
    pub update_available: bool,
    pub extension_update_available: ExtensionUpdate,
}

impl CacheRecord {
    /// Decode a record from a `get` result of the local namespace.
    pub fn from_entries(entries: &HashMap<String, Value>) -> Self {
        let string = |key: &str| {
            entries
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            script_version: string(SCRIPT_VERSION_KEY),
            latest_script_version: string(LATEST_SCRIPT_VERSION_KEY),
            last_check_timestamp: entries.get(LAST_CHECK_TIMESTAMP_KEY).and_then(Value::as_i64),
            update_available: entries
                .get(UPDATE_AVAILABLE_KEY)
                .and_then(Value::as_bool)
                .unwrap_or(false),
            extension_update_available: ExtensionUpdate::from_value(
                entries.get(EXTENSION_UPDATE_AVAILABLE_KEY),
            ),
        }
    }

    /// The field group written by a successful version-marker refresh.
    pub fn refresh_entries(
        latest_version: &str,
        checked_at_ms: i64,
        update_available: bool,
    ) -> HashMap<String, Value> {
        HashMap::from([
            (
                LATEST_SCRIPT_VERSION_KEY.to_string(),
                Value::String(latest_version.to_string()),
            ),
            (
                LAST_CHECK_TIMESTAMP_KEY.to_string(),
                Value::from(checked_at_ms),
            ),
            (
                UPDATE_AVAILABLE_KEY.to_string(),
                Value::Bool(update_available),
            ),
        ])
    }

    /// Whether the record is older than `ttl_ms` at `now_ms`.
    ///
    /// A record that was never refreshed is always stale.
    pub fn is_stale_at(&self, now_ms: i64, ttl_ms: i64) -> bool {
        match self.last_check_timestamp {
            Some(ts) => now_ms.saturating_sub(ts) > ttl_ms,
            None => true,
        }
    }
}
