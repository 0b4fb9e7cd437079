use super::ContentStore;
use crate::error::{DeltaError, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Content store backed by files under a root directory
///
/// Keys map to relative paths (`item/v3-<digest>` -> `<root>/item/v3-<digest>`). Writes go
/// through a temp file and an atomic rename, so readers never observe a
/// half-written version.
#[derive(Debug, Clone)]
pub struct LocalContentStore {
    root: PathBuf,
}

impl LocalContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path inside the root
    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(DeltaError::InvalidRequest(format!(
                "invalid storage key: {:?}",
                key
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| DeltaError::read(format!("reading {}", path.display()), e))
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;

        tokio::task::spawn_blocking(move || {
            let parent = path
                .parent()
                .ok_or_else(|| DeltaError::Storage(format!("no parent for {}", path.display())))?;
            std::fs::create_dir_all(parent)?;

            let mut temp = tempfile::NamedTempFile::new_in(parent)?;
            temp.write_all(&data)?;
            temp.as_file().sync_all()?;
            temp.persist(&path).map_err(|e| DeltaError::Io(e.error))?;

            tracing::debug!("Stored {} bytes at {}", data.len(), path.display());
            Ok::<(), DeltaError>(())
        })
        .await
        .map_err(|e| DeltaError::Io(std::io::Error::other(e.to_string())))?
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
