//! JSON request/response shapes for the signature and delta endpoints

use crate::delta::{BlockChecksum, Delta, DeltaOp, Signature, STRONG_LEN};
use crate::error::{DeltaError, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

/// Response to a signature fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureResponse {
    pub item_id: String,
    pub block_size: usize,
    pub version_number: u64,
    /// Length of the signed version; optional on the wire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    pub blocks: Vec<SignatureBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureBlock {
    pub index: u64,
    pub weak_checksum: u64,
    pub strong_checksum: String,
}

impl SignatureResponse {
    pub fn from_signature(item_id: &str, version_number: u64, signature: &Signature) -> Self {
        Self {
            item_id: item_id.to_string(),
            block_size: signature.block_size,
            version_number,
            file_size: Some(signature.file_size),
            blocks: signature
                .blocks
                .iter()
                .map(|b| SignatureBlock {
                    index: b.index,
                    weak_checksum: b.weak,
                    strong_checksum: b.strong_hex(),
                })
                .collect(),
        }
    }

    /// Rebuild an engine signature on the client side
    ///
    /// Offsets and sizes are derived from the block size and `fileSize`.
    /// Without `fileSize` every block is taken as full-size; a short final
    /// block then never verifies and those bytes travel as literals.
    pub fn into_signature(self) -> Result<Signature> {
        if self.block_size == 0 {
            return Err(DeltaError::InvalidRequest("signature block size is zero".to_string()));
        }

        let block_size = self.block_size as u64;
        let mut blocks = Vec::with_capacity(self.blocks.len());
        let mut covered = 0u64;
        for block in self.blocks {
            let offset = block.index.checked_mul(block_size).ok_or_else(|| {
                DeltaError::InvalidRequest(format!(
                    "signature block {} is out of range for {}-byte blocks",
                    block.index, block_size
                ))
            })?;
            let size = match self.file_size {
                Some(file_size) if offset >= file_size => {
                    return Err(DeltaError::InvalidRequest(format!(
                        "signature block {} lies beyond the {}-byte file",
                        block.index, file_size
                    )));
                }
                Some(file_size) => (file_size - offset).min(block_size),
                None => block_size,
            };
            let mut strong = [0u8; STRONG_LEN];
            hex::decode_to_slice(&block.strong_checksum, &mut strong).map_err(|e| {
                DeltaError::InvalidRequest(format!(
                    "bad strong checksum for block {}: {}",
                    block.index, e
                ))
            })?;
            covered = covered.max(offset.saturating_add(size));
            blocks.push(BlockChecksum {
                index: block.index,
                offset,
                size: size as usize,
                weak: block.weak_checksum,
                strong,
            });
        }

        Ok(Signature {
            file_id: self.item_id,
            file_size: self.file_size.unwrap_or(covered),
            block_size: self.block_size,
            blocks,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockOperation {
    Copy,
    Insert,
}

/// One instruction of an uploaded delta
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaBlock {
    /// Position of this instruction in the delta
    pub index: u64,
    pub operation: BlockOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_index: Option<u64>,
    /// Base64 literal bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaUploadRequest {
    pub base_version: u64,
    /// Block size of the signature the client diffed against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_size: Option<usize>,
    pub blocks: Vec<DeltaBlock>,
    pub new_checksum: String,
}

impl DeltaUploadRequest {
    /// Build the wire form of a locally computed delta
    pub fn from_delta(base_version: u64, delta: &Delta, new_checksum: impl Into<String>) -> Self {
        let blocks = delta
            .ops
            .iter()
            .enumerate()
            .map(|(i, op)| match op {
                DeltaOp::Copy { index } => DeltaBlock {
                    index: i as u64,
                    operation: BlockOperation::Copy,
                    source_index: Some(*index),
                    data: None,
                },
                DeltaOp::Data(bytes) => DeltaBlock {
                    index: i as u64,
                    operation: BlockOperation::Insert,
                    source_index: None,
                    data: Some(STANDARD.encode(bytes)),
                },
            })
            .collect();

        Self {
            base_version,
            block_size: Some(delta.block_size),
            blocks,
            new_checksum: new_checksum.into(),
        }
    }

    /// Convert wire blocks into an engine delta against a `base_len`-byte base
    ///
    /// Instructions are ordered by their `index`. The target size is not
    /// on the wire, so it is derived from literal lengths plus the base
    /// ranges the copies address.
    pub fn to_delta(&self, block_size: usize, base_len: u64) -> Result<Delta> {
        if block_size == 0 {
            return Err(DeltaError::contract("delta block size must be positive"));
        }

        let mut blocks: Vec<&DeltaBlock> = self.blocks.iter().collect();
        blocks.sort_by_key(|b| b.index);
        if let Some(pair) = blocks.windows(2).find(|w| w[0].index == w[1].index) {
            return Err(DeltaError::InvalidRequest(format!(
                "duplicate delta block index {}",
                pair[0].index
            )));
        }

        let mut delta = Delta::new(block_size, 0);
        let mut target_size = 0u64;
        for block in blocks {
            match block.operation {
                BlockOperation::Copy => {
                    let source = block.source_index.ok_or_else(|| {
                        DeltaError::InvalidRequest(format!(
                            "COPY block {} has no sourceIndex",
                            block.index
                        ))
                    })?;
                    // Out-of-range copies add nothing here; the applier rejects them
                    let start = source.saturating_mul(block_size as u64);
                    target_size += base_len.saturating_sub(start).min(block_size as u64);
                    delta.ops.push(DeltaOp::Copy { index: source });
                }
                BlockOperation::Insert => {
                    let encoded = block.data.as_deref().ok_or_else(|| {
                        DeltaError::InvalidRequest(format!("INSERT block {} has no data", block.index))
                    })?;
                    let bytes = STANDARD.decode(encoded).map_err(|e| {
                        DeltaError::InvalidRequest(format!(
                            "INSERT block {} has invalid base64: {}",
                            block.index, e
                        ))
                    })?;
                    target_size += bytes.len() as u64;
                    delta.ops.push(DeltaOp::Data(bytes));
                }
            }
        }

        delta.target_size = target_size;
        Ok(delta)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaUploadResponse {
    pub success: bool,
    pub item_id: String,
    pub applied_blocks: usize,
    pub new_version: u64,
    pub new_checksum: String,
}
