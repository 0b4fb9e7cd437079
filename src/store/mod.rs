pub mod local;
pub mod memory;
pub mod versiondb;

pub use local::LocalContentStore;
pub use memory::{MemoryContentStore, MemoryVersionRepository};
pub use versiondb::SqliteVersionRepository;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Byte storage backend holding whole-file content by key
///
/// The delta engine never talks to storage itself; the service layer
/// fetches base bytes through this trait and hands reconstructed bytes
/// back to it.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Read the full content stored under `key`
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Store `data` under `key`, replacing any previous content
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Remove the content under `key`; a missing key is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Metadata of one stored version of an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileVersion {
    pub item_id: String,
    pub version: u64,
    pub content_key: String,
    pub size: u64,
    /// Whole-file checksum, "algo:hex"
    pub checksum: String,
    /// RFC 3339
    pub created_at: String,
}

impl FileVersion {
    pub fn new(item_id: &str, version: u64, size: u64, checksum: String) -> Self {
        Self {
            item_id: item_id.to_string(),
            version,
            content_key: content_key(item_id, version, &checksum),
            size,
            checksum,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Storage key for a version's bytes
///
/// The key carries the content digest, so two uploads competing for the
/// same version number only share a key when their bytes are identical.
pub fn content_key(item_id: &str, version: u64, checksum: &str) -> String {
    let digest: String = checksum
        .rsplit(':')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    format!("{}/v{}-{}", item_id, version, digest)
}

/// Version metadata and "latest" pointers
#[async_trait]
pub trait VersionRepository: Send + Sync {
    async fn latest(&self, item_id: &str) -> Result<Option<FileVersion>>;

    async fn get(&self, item_id: &str, version: u64) -> Result<Option<FileVersion>>;

    /// Record a new version
    ///
    /// Versions are numbered 1, 2, 3... per item. Recording anything but
    /// `latest + 1` fails, so two uploads racing from the same base
    /// cannot both win. Content is written before this call under a
    /// digest-qualified key, so the losing upload never touches the bytes
    /// the winner's record points at.
    async fn record(&self, version: FileVersion) -> Result<()>;
}
