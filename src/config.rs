use crate::delta::{MatchPreference, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
use crate::error::{DeltaError, Result};
use crate::integrity::ChecksumType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration loaded from `config.toml`
///
/// Every section is optional; a missing file means defaults.
///
/// ```toml
/// [delta]
/// block_size = 4096
/// match_preference = "prefer-unused"
///
/// [repository]
/// path = "/srv/deltasync"
/// checksum = "blake3"
///
/// [signature_cache]
/// capacity = 128
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub delta: DeltaConfig,
    pub repository: RepositoryConfig,
    pub signature_cache: SignatureCacheConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeltaConfig {
    /// Fixed block size; unset means sqrt(file size) within the bounds below
    pub block_size: Option<usize>,
    pub min_block_size: usize,
    pub max_block_size: usize,
    pub match_preference: MatchPreference,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            block_size: None,
            min_block_size: MIN_BLOCK_SIZE,
            max_block_size: MAX_BLOCK_SIZE,
            match_preference: MatchPreference::First,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositoryConfig {
    pub path: Option<PathBuf>,
    pub checksum: ChecksumType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignatureCacheConfig {
    /// Max cached signatures; 0 disables caching
    pub capacity: usize,
}

impl Default for SignatureCacheConfig {
    fn default() -> Self {
        Self { capacity: 64 }
    }
}

impl Config {
    /// Default config file location
    pub fn config_path() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| DeltaError::Config("Cannot determine config directory".to_string()))?;
        Ok(dir.join("deltasync").join("config.toml"))
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            DeltaError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&text)
            .map_err(|e| DeltaError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| DeltaError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let delta = &self.delta;
        if delta.min_block_size == 0 {
            return Err(DeltaError::Config("delta.min_block_size must be positive".to_string()));
        }
        if delta.min_block_size > delta.max_block_size {
            return Err(DeltaError::Config(format!(
                "delta.min_block_size ({}) exceeds delta.max_block_size ({})",
                delta.min_block_size, delta.max_block_size
            )));
        }
        if delta.block_size == Some(0) {
            return Err(DeltaError::Config("delta.block_size must be positive".to_string()));
        }
        Ok(())
    }

    /// Block size to use for a file of `file_size` bytes
    pub fn block_size_for(&self, file_size: u64) -> usize {
        match self.delta.block_size {
            Some(size) => size,
            None => {
                let size = (file_size as f64).sqrt() as usize;
                size.clamp(self.delta.min_block_size, self.delta.max_block_size)
            }
        }
    }

    /// Repository directory: configured, else the platform data dir
    pub fn repository_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.repository.path {
            return Ok(path.clone());
        }
        let dir = dirs::data_dir()
            .ok_or_else(|| DeltaError::Config("Cannot determine data directory".to_string()))?;
        Ok(dir.join("deltasync"))
    }
}
