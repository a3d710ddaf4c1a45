//! Startup migration of the persisted key space.

use crate::error::RelayResult;
use burner_core::cache_record::{LAST_CHECK_TIMESTAMP_KEY, SCRIPT_PAYLOAD_KEY, SCRIPT_VERSION_KEY};
use burner_core::flags::{ConfigFlags, ENABLED_KEY, FLAG_KEYS};
use burner_storage::Stores;
use serde_json::Value;
use std::collections::HashMap;

/// Payload cache formerly kept in the synced namespace.
pub const LEGACY_SCRIPT_CACHE_KEY: &str = "bananaburner_script_cache";
/// Cache timestamp formerly kept in the synced namespace.
pub const LEGACY_SCRIPT_TIMESTAMP_KEY: &str = "bananaburner_script_timestamp";
/// Former name of the `enabled` flag.
pub const LEGACY_ENABLED_KEY: &str = "extensionEnabled";

/// Legacy synced keys and the local keys that replace them.
const MOVED_TO_LOCAL: [(&str, &str); 3] = [
    (LEGACY_SCRIPT_CACHE_KEY, SCRIPT_PAYLOAD_KEY),
    (LEGACY_SCRIPT_TIMESTAMP_KEY, LAST_CHECK_TIMESTAMP_KEY),
    (SCRIPT_VERSION_KEY, SCRIPT_VERSION_KEY),
];

/// What a migration run changed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Local keys written from legacy synced values.
    pub moved: Vec<String>,
    /// Synced keys deleted.
    pub removed: Vec<String>,
    /// Flags written with their defaults.
    pub seeded: Vec<String>,
}

impl MigrationReport {
    pub fn is_empty(&self) -> bool {
        self.moved.is_empty() && self.removed.is_empty() && self.seeded.is_empty()
    }
}

/// Move legacy keys out of the synced namespace and seed missing flags.
///
/// Values already present in the local namespace are newer than anything
/// left behind in synced storage and are kept. Running this twice is a no-op.
pub async fn migrate(stores: &Stores) -> RelayResult<MigrationReport> {
    let mut report = MigrationReport::default();

    let legacy_keys: Vec<&str> = MOVED_TO_LOCAL
        .iter()
        .map(|(from, _)| *from)
        .chain([LEGACY_ENABLED_KEY])
        .chain(FLAG_KEYS)
        .collect();
    let synced = stores.synced.get(&legacy_keys).await?;

    let local_targets: Vec<&str> = MOVED_TO_LOCAL.iter().map(|(_, to)| *to).collect();
    let local = stores.local.get(&local_targets).await?;

    let mut to_local = HashMap::new();
    let mut to_remove = Vec::new();
    for (from, to) in MOVED_TO_LOCAL {
        let Some(value) = synced.get(from) else {
            continue;
        };
        if !local.contains_key(to) {
            to_local.insert(to.to_string(), value.clone());
            report.moved.push(to.to_string());
        }
        to_remove.push(from);
    }

    let mut flags = HashMap::new();
    if let Some(legacy) = synced.get(LEGACY_ENABLED_KEY) {
        if !synced.contains_key(ENABLED_KEY)
            && let Some(enabled) = legacy.as_bool()
        {
            flags.insert(ENABLED_KEY.to_string(), Value::Bool(enabled));
            report.moved.push(ENABLED_KEY.to_string());
        }
        to_remove.push(LEGACY_ENABLED_KEY);
    }
    for (key, value) in ConfigFlags::default().to_entries() {
        if !synced.contains_key(&key) && !flags.contains_key(&key) {
            report.seeded.push(key.clone());
            flags.insert(key, value);
        }
    }

    // Copy before deleting so an interrupted run never loses data.
    if !to_local.is_empty() {
        stores.local.set(to_local).await?;
    }
    if !flags.is_empty() {
        stores.synced.set(flags).await?;
    }
    if !to_remove.is_empty() {
        stores.synced.remove(&to_remove).await?;
        report.removed = to_remove.iter().map(|k| k.to_string()).collect();
    }

    report.moved.sort();
    report.seeded.sort();
    Ok(report)
}

/// Run [`migrate`], logging instead of failing.
pub async fn run_startup_migration(stores: &Stores) {
    match migrate(stores).await {
        Ok(report) if report.is_empty() => tracing::debug!("Key space already migrated"),
        Ok(report) => tracing::info!(
            moved = ?report.moved,
            removed = ?report.removed,
            seeded = ?report.seeded,
            "Migrated persisted keys"
        ),
        Err(e) => tracing::warn!(error = %e, "Key migration failed, continuing startup"),
    }
}
