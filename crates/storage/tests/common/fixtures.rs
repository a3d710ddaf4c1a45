use burner_storage::{FilesystemStore, KeyValueStore, MemoryStore, Namespace};
use std::sync::Arc;
use tempfile::TempDir;

/// A store under test plus whatever keeps it alive.
pub struct Backend {
    pub name: &'static str,
    pub store: Arc<dyn KeyValueStore>,
    _dir: Option<TempDir>,
}

/// One instance of every backend, for behavior that must hold across all of them.
pub async fn open_backends(namespace: Namespace) -> Vec<Backend> {
    let dir = tempfile::tempdir().unwrap();
    let fs_store = FilesystemStore::new(dir.path(), namespace).await.unwrap();
    vec![
        Backend {
            name: "memory",
            store: Arc::new(MemoryStore::new()),
            _dir: None,
        },
        Backend {
            name: "filesystem",
            store: Arc::new(fs_store),
            _dir: Some(dir),
        },
    ]
}
