use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use axum::async_trait;
use bytes::Bytes;

/// File storage for uploaded profile pictures. Keys are flat file names
/// assigned by the caller; the stored objects are served statically under
/// `/uploads/{key}`.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
}

/// Disk-backed storage rooted at the configured uploads directory.
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl StorageClient for DiskStorage {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("create upload dir {}", self.root.display()))?;
        let path = self.root.join(key);
        tokio::fs::write(&path, &body)
            .await
            .with_context(|| format!("write upload {}", path.display()))?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        let path = self.root.join(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("delete upload {}", path.display())),
        }
    }
}

/// In-memory storage used by unit tests and `AppState::fake`.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Bytes>>,
}

impl MemoryStorage {
    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().expect("storage lock").contains_key(key)
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn put_object(&self, key: &str, body: Bytes) -> anyhow::Result<()> {
        self.objects
            .lock()
            .expect("storage lock")
            .insert(key.to_string(), body);
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects.lock().expect("storage lock").remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn disk_storage_roundtrip() {
        let root = std::env::temp_dir().join(format!("bwi-uploads-{}", Uuid::new_v4()));
        let storage = DiskStorage::new(&root);

        storage
            .put_object("avatar.png", Bytes::from_static(b"png-bytes"))
            .await
            .unwrap();
        let stored = tokio::fs::read(root.join("avatar.png")).await.unwrap();
        assert_eq!(stored, b"png-bytes");

        storage.delete_object("avatar.png").await.unwrap();
        assert!(!root.join("avatar.png").exists());

        tokio::fs::remove_dir_all(&root).await.unwrap();
    }

    #[tokio::test]
    async fn disk_storage_delete_is_idempotent() {
        let root = std::env::temp_dir().join(format!("bwi-uploads-{}", Uuid::new_v4()));
        let storage = DiskStorage::new(&root);
        storage.delete_object("never-existed.jpg").await.unwrap();
    }

    #[tokio::test]
    async fn memory_storage_roundtrip() {
        let storage = MemoryStorage::default();
        storage
            .put_object("pic.jpg", Bytes::from_static(b"jpg"))
            .await
            .unwrap();
        assert!(storage.contains("pic.jpg"));
        storage.delete_object("pic.jpg").await.unwrap();
        assert!(!storage.contains("pic.jpg"));
    }
}
