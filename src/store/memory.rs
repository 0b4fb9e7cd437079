use super::{ContentStore, FileVersion, VersionRepository};
use crate::error::{DeltaError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| DeltaError::Storage("in-memory store lock poisoned".to_string()))
}

/// Content store kept in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryContentStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        lock(&self.objects)?
            .get(key)
            .cloned()
            .ok_or_else(|| DeltaError::Storage(format!("no content under key {}", key)))
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        lock(&self.objects)?.insert(key.to_string(), data);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(lock(&self.objects)?.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        lock(&self.objects)?.remove(key);
        Ok(())
    }
}

/// Version repository kept in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryVersionRepository {
    versions: Arc<Mutex<HashMap<String, Vec<FileVersion>>>>,
}

impl MemoryVersionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VersionRepository for MemoryVersionRepository {
    async fn latest(&self, item_id: &str) -> Result<Option<FileVersion>> {
        Ok(lock(&self.versions)?
            .get(item_id)
            .and_then(|history| history.last().cloned()))
    }

    async fn get(&self, item_id: &str, version: u64) -> Result<Option<FileVersion>> {
        Ok(lock(&self.versions)?
            .get(item_id)
            .and_then(|history| history.iter().find(|v| v.version == version).cloned()))
    }

    async fn record(&self, version: FileVersion) -> Result<()> {
        let mut versions = lock(&self.versions)?;
        let history = versions.entry(version.item_id.clone()).or_default();
        let expected = history.last().map_or(1, |v| v.version + 1);
        if version.version != expected {
            return Err(DeltaError::Storage(format!(
                "version conflict for {}: expected {}, got {}",
                version.item_id, expected, version.version
            )));
        }
        history.push(version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_content_roundtrip() {
        let store = MemoryContentStore::new();
        assert!(!store.exists("a/v1").await.unwrap());

        store.put("a/v1", b"bytes".to_vec()).await.unwrap();
        assert!(store.exists("a/v1").await.unwrap());
        assert_eq!(store.get("a/v1").await.unwrap(), b"bytes");
        assert!(store.get("missing").await.is_err());

        store.delete("a/v1").await.unwrap();
        store.delete("a/v1").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_versions_are_sequential() {
        let repo = MemoryVersionRepository::new();
        assert!(repo.latest("doc").await.unwrap().is_none());

        repo.record(FileVersion::new("doc", 1, 3, "blake3:aa".into()))
            .await
            .unwrap();
        repo.record(FileVersion::new("doc", 2, 4, "blake3:bb".into()))
            .await
            .unwrap();

        assert_eq!(repo.latest("doc").await.unwrap().unwrap().version, 2);
        assert_eq!(repo.get("doc", 1).await.unwrap().unwrap().size, 3);
        assert!(repo.get("doc", 7).await.unwrap().is_none());

        // Racing writer that also based itself on version 1
        let err = repo
            .record(FileVersion::new("doc", 2, 9, "blake3:cc".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, DeltaError::Storage(_)));
    }
}
