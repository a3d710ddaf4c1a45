//! Key-value store abstraction and backends for the burner relay.
//!
//! This crate provides:
//! - The async `KeyValueStore` trait over JSON values
//! - The synced/local namespace split
//! - Backends: in-memory and one-JSON-document-per-namespace on disk

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{filesystem::FilesystemStore, memory::MemoryStore};
pub use error::{StorageError, StorageResult};
pub use traits::{KeyValueStore, Namespace, Stores};

use burner_core::config::StorageConfig;
use std::sync::Arc;

/// Create both namespaces from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Stores> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Memory => Ok(Stores::memory()),
        StorageConfig::Filesystem { path } => {
            let synced = FilesystemStore::new(path, Namespace::Synced).await?;
            let local = FilesystemStore::new(path, Namespace::Local).await?;
            Ok(Stores::new(Arc::new(synced), Arc::new(local)))
        }
    }
}

impl Stores {
    /// Fresh in-memory namespaces.
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().join("store"),
        };

        let stores = from_config(&config).await.unwrap();
        stores
            .synced
            .set(HashMap::from([("enabled".to_string(), json!(true))]))
            .await
            .unwrap();
        assert!(temp.path().join("store").join("synced.json").exists());
        assert_eq!(stores.local.backend_name(), "filesystem");
    }

    #[tokio::test]
    async fn from_config_memory_ok() {
        let stores = from_config(&StorageConfig::Memory).await.unwrap();
        assert_eq!(stores.namespace(Namespace::Synced).backend_name(), "memory");
    }

    #[tokio::test]
    async fn from_config_rejects_empty_path() {
        let config = StorageConfig::Filesystem {
            path: Default::default(),
        };

        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(StorageError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
