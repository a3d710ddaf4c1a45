//! Storage trait definitions.

use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The two partitions of the privileged store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Small and replicated across devices. Holds configuration flags.
    Synced,
    /// Larger and device-only. Holds cache and version bookkeeping.
    Local,
}

impl Namespace {
    pub const ALL: [Namespace; 2] = [Namespace::Synced, Namespace::Local];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Async key-value store over JSON values.
///
/// `get` returns only the keys that are present; absent keys are simply
/// missing from the mapping. `remove` of an absent key is not an error.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Fetch the given keys.
    async fn get(&self, keys: &[&str]) -> StorageResult<HashMap<String, Value>>;

    /// Write every entry of `entries`, replacing existing values.
    async fn set(&self, entries: HashMap<String, Value>) -> StorageResult<()>;

    /// Delete the given keys.
    async fn remove(&self, keys: &[&str]) -> StorageResult<()>;

    /// Backend name for logging.
    fn backend_name(&self) -> &'static str;
}

/// Both namespaces of one store, as handed to the relay components.
#[derive(Clone)]
pub struct Stores {
    pub synced: Arc<dyn KeyValueStore>,
    pub local: Arc<dyn KeyValueStore>,
}

impl Stores {
    pub fn new(synced: Arc<dyn KeyValueStore>, local: Arc<dyn KeyValueStore>) -> Self {
        Self { synced, local }
    }

    pub fn namespace(&self, namespace: Namespace) -> &Arc<dyn KeyValueStore> {
        match namespace {
            Namespace::Synced => &self.synced,
            Namespace::Local => &self.local,
        }
    }
}

impl fmt::Debug for Stores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stores")
            .field("synced", &self.synced.backend_name())
            .field("local", &self.local.backend_name())
            .finish()
    }
}

/// Reject keys that cannot be persisted.
pub(crate) fn validate_keys<'a>(keys: impl IntoIterator<Item = &'a str>) -> StorageResult<()> {
    for key in keys {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
    }
    Ok(())
}
