//! Local filesystem key-value store.
//!
//! Each namespace is one JSON object document. Every mutation rewrites the
//! document through a temp file, fsync and rename, so readers never observe a
//! partially written store.

use crate::error::{StorageError, StorageResult};
use crate::traits::{KeyValueStore, Namespace, validate_keys};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

/// Filesystem-backed store for one namespace.
pub struct FilesystemStore {
    namespace: Namespace,
    path: PathBuf,
    /// Serializes read-modify-write cycles on the document.
    write_lock: Mutex<()>,
}

impl FilesystemStore {
    /// Open (or lazily create) the document for `namespace` under `root`.
    pub async fn new(root: impl AsRef<Path>, namespace: Namespace) -> StorageResult<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root).await?;
        Ok(Self {
            namespace,
            path: root.join(format!("{}.json", namespace.as_str())),
            write_lock: Mutex::new(()),
        })
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StorageResult<Map<String, Value>> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(StorageError::Io(e)),
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }

        match serde_json::from_slice::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(StorageError::Corrupt {
                namespace: self.namespace.as_str(),
                reason: format!("expected a JSON object, found {}", type_name(&other)),
            }),
            Err(e) => Err(StorageError::Corrupt {
                namespace: self.namespace.as_str(),
                reason: e.to_string(),
            }),
        }
    }

    async fn persist(&self, map: Map<String, Value>) -> StorageResult<()> {
        let data = serde_json::to_vec_pretty(&Value::Object(map))?;

        // Unique temp name so concurrent processes sharing a root never collide.
        let temp_path = self.path.with_file_name(format!(
            "{}.json.tmp.{}",
            self.namespace.as_str(),
            Uuid::new_v4()
        ));
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        if let Err(e) = fs::rename(&temp_path, &self.path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[async_trait]
impl KeyValueStore for FilesystemStore {
    #[instrument(skip(self), fields(backend = "filesystem", namespace = %self.namespace))]
    async fn get(&self, keys: &[&str]) -> StorageResult<HashMap<String, Value>> {
        let map = self.load().await?;
        Ok(keys
            .iter()
            .filter_map(|k| map.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    #[instrument(skip(self, entries), fields(backend = "filesystem", namespace = %self.namespace, count = entries.len()))]
    async fn set(&self, entries: HashMap<String, Value>) -> StorageResult<()> {
        validate_keys(entries.keys().map(String::as_str))?;
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        map.extend(entries);
        self.persist(map).await
    }

    #[instrument(skip(self), fields(backend = "filesystem", namespace = %self.namespace))]
    async fn remove(&self, keys: &[&str]) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.load().await?;
        let before = map.len();
        for key in keys {
            map.remove(*key);
        }
        if map.len() == before {
            return Ok(());
        }
        self.persist(map).await
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }
}
