pub mod cache;
pub mod wire;

pub use cache::SignatureCache;
pub use wire::{
    BlockOperation, DeltaBlock, DeltaUploadRequest, DeltaUploadResponse, SignatureBlock,
    SignatureResponse,
};

use crate::config::Config;
use crate::delta::{apply_delta, generate_signature_from_bytes, Signature};
use crate::error::{DeltaError, Result};
use crate::integrity;
use crate::store::{ContentStore, FileVersion, VersionRepository};
use std::sync::Arc;

/// Serves signature fetches and delta uploads for stored items
///
/// Storage and version metadata live behind the `ContentStore` and
/// `VersionRepository` traits. All engine work (signatures, delta
/// application, checksums) runs on tokio's blocking pool.
pub struct DeltaSyncService<S, V> {
    store: S,
    versions: V,
    config: Config,
    cache: SignatureCache,
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DeltaError::Io(std::io::Error::other(e.to_string())))?
}

impl<S: ContentStore, V: VersionRepository> DeltaSyncService<S, V> {
    pub fn new(store: S, versions: V, config: Config) -> Self {
        let cache = SignatureCache::new(config.signature_cache.capacity);
        Self {
            store,
            versions,
            config,
            cache,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &SignatureCache {
        &self.cache
    }

    async fn require_latest(&self, item_id: &str) -> Result<FileVersion> {
        self.versions
            .latest(item_id)
            .await?
            .ok_or_else(|| DeltaError::NotFound {
                item_id: item_id.to_string(),
                version: None,
            })
    }

    async fn require_version(&self, item_id: &str, version: u64) -> Result<FileVersion> {
        self.versions
            .get(item_id, version)
            .await?
            .ok_or_else(|| DeltaError::NotFound {
                item_id: item_id.to_string(),
                version: Some(version),
            })
    }

    /// Signature of the latest version of `item_id`
    ///
    /// Without an explicit block size the configured policy picks one
    /// from the file size.
    pub async fn fetch_signature(
        &self,
        item_id: &str,
        block_size: Option<usize>,
    ) -> Result<SignatureResponse> {
        let latest = self.require_latest(item_id).await?;
        let block_size = block_size.unwrap_or_else(|| self.config.block_size_for(latest.size));
        if block_size == 0 {
            return Err(DeltaError::contract("block size must be positive"));
        }

        let signature = self.signature_for(&latest, block_size).await?;
        Ok(SignatureResponse::from_signature(
            item_id,
            latest.version,
            &signature,
        ))
    }

    async fn signature_for(&self, version: &FileVersion, block_size: usize) -> Result<Arc<Signature>> {
        if let Some(hit) = self.cache.get(&version.item_id, version.version, block_size) {
            tracing::debug!(
                "Signature cache hit for {} v{} ({} byte blocks)",
                version.item_id,
                version.version,
                block_size
            );
            return Ok(hit);
        }

        let bytes = self.store.get(&version.content_key).await?;
        let item_id = version.item_id.clone();
        let signature = Arc::new(
            blocking(move || generate_signature_from_bytes(item_id, &bytes, block_size)).await?,
        );

        self.cache.insert(
            &version.item_id,
            version.version,
            block_size,
            Arc::clone(&signature),
        );
        Ok(signature)
    }

    /// Apply an uploaded delta to its base version and store the result
    ///
    /// The reconstruction is verified against `new_checksum` before
    /// anything is written; on any failure nothing is stored.
    pub async fn upload_delta(
        &self,
        item_id: &str,
        request: DeltaUploadRequest,
    ) -> Result<DeltaUploadResponse> {
        let result = self.try_upload_delta(item_id, request).await;
        if let Err(e) = &result {
            tracing::warn!("Rejected delta upload for {}: {}", item_id, e);
        }
        result
    }

    async fn try_upload_delta(
        &self,
        item_id: &str,
        request: DeltaUploadRequest,
    ) -> Result<DeltaUploadResponse> {
        let base = self.require_version(item_id, request.base_version).await?;
        let latest = self.require_latest(item_id).await?;
        if latest.version != base.version {
            tracing::warn!(
                "Delta for {} is based on v{} but latest is v{}; intermediate versions are superseded",
                item_id,
                base.version,
                latest.version
            );
        }

        let block_size = request
            .block_size
            .unwrap_or_else(|| self.config.block_size_for(base.size));
        let delta = request.to_delta(block_size, base.size)?;
        let applied_blocks = delta.ops.len();

        let base_bytes = self.store.get(&base.content_key).await?;
        if base_bytes.len() as u64 != base.size {
            return Err(DeltaError::stale(format!(
                "stored base for {} v{} is {} bytes, metadata says {}",
                item_id,
                base.version,
                base_bytes.len(),
                base.size
            )));
        }

        let checksum_type = self.config.repository.checksum;
        let expected = request.new_checksum;
        let (new_bytes, checksum) = blocking(move || {
            let new_bytes = apply_delta(&base_bytes, &delta)?;
            let checksum = integrity::verify(&new_bytes, &expected, checksum_type)?;
            Ok((new_bytes, checksum))
        })
        .await?;

        let version = self
            .store_version(item_id, latest.version + 1, new_bytes, checksum.to_string())
            .await?;

        tracing::info!(
            "Applied delta to {} v{} -> v{} ({} instructions)",
            item_id,
            base.version,
            version.version,
            applied_blocks
        );

        Ok(DeltaUploadResponse {
            success: true,
            item_id: item_id.to_string(),
            applied_blocks,
            new_version: version.version,
            new_checksum: checksum.to_hex(),
        })
    }

    /// Store a whole file as the next version of `item_id`
    ///
    /// This is also the fallback after a stale-base or checksum rejection.
    pub async fn upload_full(&self, item_id: &str, data: Vec<u8>) -> Result<FileVersion> {
        let next = match self.versions.latest(item_id).await? {
            Some(latest) => latest.version + 1,
            None => 1,
        };

        let checksum_type = self.config.repository.checksum;
        let (data, checksum) = blocking(move || {
            let checksum = checksum_type.compute(&data);
            Ok((data, checksum))
        })
        .await?;

        let version = self
            .store_version(item_id, next, data, checksum.to_string())
            .await?;
        tracing::info!(
            "Stored {} v{} ({} bytes, full upload)",
            item_id,
            version.version,
            version.size
        );
        Ok(version)
    }

    async fn store_version(
        &self,
        item_id: &str,
        version: u64,
        data: Vec<u8>,
        checksum: String,
    ) -> Result<FileVersion> {
        let record = FileVersion::new(item_id, version, data.len() as u64, checksum);
        self.store.put(&record.content_key, data).await?;
        if let Err(e) = self.versions.record(record.clone()).await {
            self.discard_unrecorded(&record).await;
            return Err(e);
        }
        Ok(record)
    }

    /// Drop bytes written for a version that lost the race to be recorded
    ///
    /// Identical content maps to the same key, so the blob is only removed
    /// when the committed record points elsewhere.
    async fn discard_unrecorded(&self, record: &FileVersion) {
        let committed = match self.versions.get(&record.item_id, record.version).await {
            Ok(committed) => committed,
            Err(e) => {
                tracing::warn!("Cannot check {} v{}: {}", record.item_id, record.version, e);
                return;
            }
        };
        if committed.is_some_and(|c| c.content_key == record.content_key) {
            return;
        }
        if let Err(e) = self.store.delete(&record.content_key).await {
            tracing::warn!("Failed to remove orphaned {}: {}", record.content_key, e);
        }
    }

    /// Stored bytes of a version (latest when `version` is None)
    pub async fn download(
        &self,
        item_id: &str,
        version: Option<u64>,
    ) -> Result<(FileVersion, Vec<u8>)> {
        let record = match version {
            Some(v) => self.require_version(item_id, v).await?,
            None => self.require_latest(item_id).await?,
        };
        let data = self.store.get(&record.content_key).await?;
        Ok((record, data))
    }
}
