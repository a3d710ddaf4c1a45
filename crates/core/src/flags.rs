//! Configuration flags persisted in the synced namespace.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Synced-namespace key for the master switch.
pub const ENABLED_KEY: &str = "enabled";
/// Synced-namespace key for the override-source switch.
pub const OVERRIDE_SOURCE_KEY: &str = "overrideSourceEnabled";
/// Synced-namespace key for the QUIC suppression switch.
pub const QUIC_DISABLED_KEY: &str = "quicDisabled";

/// All synced keys owned by [`ConfigFlags`].
pub const FLAG_KEYS: [&str; 3] = [ENABLED_KEY, OVERRIDE_SOURCE_KEY, QUIC_DISABLED_KEY];

/// User-facing toggles.
///
/// An absent key always decodes to its default; a stored value of the wrong
/// type is treated the same as an absent one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFlags {
    pub enabled: bool,
    pub override_source_enabled: bool,
    pub quic_disabled: bool,
}

impl Default for ConfigFlags {
    fn default() -> Self {
        Self {
            enabled: true,
            override_source_enabled: true,
            quic_disabled: false,
        }
    }
}

impl ConfigFlags {
    /// Decode flags from a `get` result of the synced namespace.
    pub fn from_entries(entries: &HashMap<String, Value>) -> Self {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| {
            entries
                .get(key)
                .and_then(Value::as_bool)
                .unwrap_or(default)
        };
        Self {
            enabled: flag(ENABLED_KEY, defaults.enabled),
            override_source_enabled: flag(OVERRIDE_SOURCE_KEY, defaults.override_source_enabled),
            quic_disabled: flag(QUIC_DISABLED_KEY, defaults.quic_disabled),
        }
    }

    /// Encode every flag as a `set` mapping.
    pub fn to_entries(&self) -> HashMap<String, Value> {
        HashMap::from([
            (ENABLED_KEY.to_string(), Value::Bool(self.enabled)),
            (
                OVERRIDE_SOURCE_KEY.to_string(),
                Value::Bool(self.override_source_enabled),
            ),
            (QUIC_DISABLED_KEY.to_string(), Value::Bool(self.quic_disabled)),
        ])
    }

    /// Whether the override-and-redirect rule group should be installed.
    pub fn override_active(&self) -> bool {
        self.enabled && self.override_source_enabled
    }
}
