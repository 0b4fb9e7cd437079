use super::RollingChecksum;
use crate::error::{DeltaError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Length of the strong block checksum (XXH3-128)
pub const STRONG_LEN: usize = 16;

/// Block checksum containing both weak and strong hashes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockChecksum {
    /// Block index (0-based)
    pub index: u64,
    /// Byte offset in file
    pub offset: u64,
    /// Block size in bytes (the final block may be short)
    pub size: usize,
    /// Weak rolling checksum
    pub weak: u64,
    /// Strong checksum (XXH3-128), hex on the wire
    #[serde(with = "strong_hex")]
    pub strong: [u8; STRONG_LEN],
}

impl BlockChecksum {
    /// Strong checksum as 32 lowercase hex chars
    pub fn strong_hex(&self) -> String {
        hex::encode(self.strong)
    }
}

/// Everything a client needs to diff a new file against a stored one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub file_id: String,
    pub file_size: u64,
    pub block_size: usize,
    pub blocks: Vec<BlockChecksum>,
}

impl Signature {
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// Strong checksum of a block
pub fn strong_checksum(data: &[u8]) -> [u8; STRONG_LEN] {
    xxhash_rust::xxh3::xxh3_128(data).to_be_bytes()
}

const MAX_RESERVED_BLOCKS: u64 = 64 * 1024;

/// Generate a signature by reading `file_size` bytes from `reader`
///
/// The source is consumed sequentially, exactly once, in `block_size`
/// reads. A source that ends early is a read failure; no partial
/// signature is returned.
pub fn generate_signature<R: Read>(
    file_id: impl Into<String>,
    mut reader: R,
    file_size: u64,
    block_size: usize,
) -> Result<Signature> {
    if block_size == 0 {
        return Err(DeltaError::contract("block size must be positive"));
    }

    let file_id = file_id.into();
    // Sizes are caller-declared; only reserve what a real read can fill
    let expected_blocks = file_size.div_ceil(block_size as u64).min(MAX_RESERVED_BLOCKS);
    let mut blocks = Vec::with_capacity(expected_blocks as usize);
    let mut buffer = vec![0u8; file_size.min(block_size as u64) as usize];
    let mut offset = 0u64;
    let mut index = 0u64;

    while offset < file_size {
        let want = (file_size - offset).min(block_size as u64) as usize;
        let block = &mut buffer[..want];
        reader.read_exact(block).map_err(|e| {
            DeltaError::read(
                format!(
                    "reading block {} of {} (offset {} of {} bytes)",
                    index, file_id, offset, file_size
                ),
                e,
            )
        })?;

        blocks.push(BlockChecksum {
            index,
            offset,
            size: want,
            weak: RollingChecksum::calculate(block),
            strong: strong_checksum(block),
        });

        offset += want as u64;
        index += 1;
    }

    tracing::debug!(
        file_id = %file_id,
        file_size,
        block_size,
        blocks = blocks.len(),
        "Generated signature"
    );

    Ok(Signature {
        file_id,
        file_size,
        block_size,
        blocks,
    })
}

/// Generate a signature for data already in memory
pub fn generate_signature_from_bytes(
    file_id: impl Into<String>,
    data: &[u8],
    block_size: usize,
) -> Result<Signature> {
    generate_signature(file_id, data, data.len() as u64, block_size)
}

/// Compute the signature of a file on disk
///
/// The file path is used as the signature's file id.
pub fn compute_checksums(path: &Path, block_size: usize) -> Result<Signature> {
    let file = File::open(path)
        .map_err(|e| DeltaError::read(format!("opening {}", path.display()), e))?;
    let file_size = file
        .metadata()
        .map_err(|e| DeltaError::read(format!("reading metadata of {}", path.display()), e))?
        .len();

    generate_signature(
        path.to_string_lossy(),
        BufReader::with_capacity(256 * 1024, file),
        file_size,
        block_size,
    )
}

mod strong_hex {
    use super::STRONG_LEN;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; STRONG_LEN], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; STRONG_LEN], D::Error> {
        let text = String::deserialize(d)?;
        let mut out = [0u8; STRONG_LEN];
        hex::decode_to_slice(&text, &mut out).map_err(D::Error::custom)?;
        Ok(out)
    }
}
