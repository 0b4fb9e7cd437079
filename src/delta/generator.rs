use super::checksum::{strong_checksum, BlockChecksum, Signature};
use super::RollingChecksum;
use crate::error::{DeltaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single delta instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeltaOp {
    /// Emit base block `index` verbatim
    Copy { index: u64 },
    /// Emit literal bytes not found in the base
    Data(#[serde(with = "literal_b64")] Vec<u8>),
}

/// Ordered instructions that turn base bytes into target bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    /// Block size of the signature this delta was computed against
    pub block_size: usize,
    /// Length of the reconstructed file
    pub target_size: u64,
    pub ops: Vec<DeltaOp>,
}

impl Delta {
    pub fn new(block_size: usize, target_size: u64) -> Self {
        Self {
            block_size,
            target_size,
            ops: Vec::new(),
        }
    }

    /// Total bytes carried as literals
    pub fn literal_bytes(&self) -> u64 {
        self.ops
            .iter()
            .map(|op| match op {
                DeltaOp::Data(data) => data.len() as u64,
                DeltaOp::Copy { .. } => 0,
            })
            .sum()
    }

    pub fn copy_count(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| matches!(op, DeltaOp::Copy { .. }))
            .count()
    }

    pub fn insert_count(&self) -> usize {
        self.ops.len() - self.copy_count()
    }

    /// Fraction of the target that has to be sent as literals (0.0 - 1.0)
    ///
    /// An empty target transfers nothing, so its ratio is 0.0.
    pub fn compression_ratio(&self) -> f64 {
        if self.target_size == 0 {
            return 0.0;
        }
        self.literal_bytes() as f64 / self.target_size as f64
    }

    fn push_literal(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        // Keep literal runs in a single op
        if let Some(DeltaOp::Data(last)) = self.ops.last_mut() {
            last.extend_from_slice(data);
        } else {
            self.ops.push(DeltaOp::Data(data.to_vec()));
        }
    }
}

/// Which base block to reference when several have identical content
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchPreference {
    /// Lowest matching block index
    #[default]
    First,
    /// Lowest matching index not referenced yet, else the lowest match
    PreferUnused,
}

#[derive(Debug, Clone, Default)]
pub struct DeltaOptions {
    pub match_preference: MatchPreference,
}

/// Weak checksum index over a signature's blocks
struct BlockMatcher<'a> {
    blocks: &'a [BlockChecksum],
    /// weak -> positions in `blocks`, ascending
    by_weak: HashMap<u64, Vec<usize>>,
    used: Vec<bool>,
    preference: MatchPreference,
}

impl<'a> BlockMatcher<'a> {
    fn new(blocks: &'a [BlockChecksum], preference: MatchPreference) -> Self {
        let mut by_weak: HashMap<u64, Vec<usize>> = HashMap::with_capacity(blocks.len());
        for (pos, block) in blocks.iter().enumerate() {
            by_weak.entry(block.weak).or_default().push(pos);
        }
        Self {
            blocks,
            by_weak,
            used: vec![false; blocks.len()],
            preference,
        }
    }

    /// Find a base block whose content equals `window`
    ///
    /// Weak hits are only candidates; every accepted match has equal
    /// length and an equal strong checksum.
    fn find(&mut self, weak: u64, window: &[u8]) -> Option<u64> {
        let candidates = self.by_weak.get(&weak)?;
        let strong = strong_checksum(window);

        let mut chosen: Option<usize> = None;
        for &pos in candidates {
            let block = &self.blocks[pos];
            if block.size != window.len() || block.strong != strong {
                continue;
            }
            match self.preference {
                MatchPreference::First => {
                    chosen = Some(pos);
                    break;
                }
                MatchPreference::PreferUnused => {
                    if !self.used[pos] {
                        chosen = Some(pos);
                        break;
                    }
                    chosen.get_or_insert(pos);
                }
            }
        }

        let pos = chosen?;
        self.used[pos] = true;
        Some(self.blocks[pos].index)
    }
}

/// Compute the delta that turns the signature's file into `data`
pub fn generate_delta(signature: &Signature, data: &[u8]) -> Result<Delta> {
    generate_delta_with(signature, data, &DeltaOptions::default())
}

/// Compute a delta with explicit matching options
///
/// Slides a `block_size` window over `data` one byte at a time, updating
/// the weak checksum in O(1). A verified match emits a copy and jumps a
/// whole block; misses accumulate into one literal run.
pub fn generate_delta_with(
    signature: &Signature,
    data: &[u8],
    options: &DeltaOptions,
) -> Result<Delta> {
    let block_size = signature.block_size;
    if block_size == 0 {
        return Err(DeltaError::contract("signature block size must be positive"));
    }

    let mut delta = Delta::new(block_size, data.len() as u64);
    let mut matcher = BlockMatcher::new(&signature.blocks, options.match_preference);

    let mut pos = 0usize;
    let mut literal_start = 0usize;
    let mut rolling: Option<RollingChecksum> = None;

    while !signature.blocks.is_empty() && pos + block_size <= data.len() {
        let window = &data[pos..pos + block_size];
        let weak = rolling
            .get_or_insert_with(|| RollingChecksum::new(window))
            .digest();

        if let Some(index) = matcher.find(weak, window) {
            delta.push_literal(&data[literal_start..pos]);
            delta.ops.push(DeltaOp::Copy { index });
            pos += block_size;
            literal_start = pos;
            // Reseed from scratch at the next window
            rolling = None;
            continue;
        }

        if pos + block_size < data.len() {
            if let Some(r) = rolling.as_mut() {
                r.roll(data[pos], data[pos + block_size]);
            }
        }
        pos += 1;
    }

    // A short final base block can only match the very end of the input
    if let Some(tail) = short_tail(signature) {
        if data.len() >= literal_start + tail.size {
            let start = data.len() - tail.size;
            let window = &data[start..];
            if let Some(index) = matcher.find(RollingChecksum::calculate(window), window) {
                delta.push_literal(&data[literal_start..start]);
                delta.ops.push(DeltaOp::Copy { index });
                literal_start = data.len();
            }
        }
    }

    delta.push_literal(&data[literal_start..]);

    tracing::debug!(
        file_id = %signature.file_id,
        target_size = delta.target_size,
        copies = delta.copy_count(),
        inserts = delta.insert_count(),
        literal_bytes = delta.literal_bytes(),
        "Generated delta"
    );

    Ok(delta)
}

fn short_tail(signature: &Signature) -> Option<&BlockChecksum> {
    signature
        .blocks
        .last()
        .filter(|b| b.size > 0 && b.size < signature.block_size)
}

mod literal_b64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        STANDARD.decode(text.as_bytes()).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::generate_signature_from_bytes;

    fn sig(data: &[u8], block_size: usize) -> Signature {
        generate_signature_from_bytes("base", data, block_size).unwrap()
    }

    #[test]
    fn test_identical_input_is_all_copies() {
        let data = b"Hello, World! This is a test of delta sync.";
        let delta = generate_delta(&sig(data, 8), data).unwrap();

        assert_eq!(delta.literal_bytes(), 0);
        assert!(delta.copy_count() >= 1);
        assert_eq!(delta.compression_ratio(), 0.0);
        // 43 bytes = 5 full blocks + 3-byte tail, tail matched too
        assert_eq!(delta.copy_count(), 6);
    }

    #[test]
    fn test_disjoint_input_is_all_literals() {
        let old = vec![b'B'; 16];
        let new = vec![b'A'; 16];
        let delta = generate_delta(&sig(&old, 16), &new).unwrap();

        assert_eq!(delta.ops, vec![DeltaOp::Data(new.clone())]);
        assert_eq!(delta.compression_ratio(), 1.0);
    }

    #[test]
    fn test_target_size() {
        let delta = generate_delta(&sig(b"AAAABBBBCCCC", 4), b"AAAAXBBBBCC").unwrap();
        assert_eq!(delta.target_size, 11);
    }

    #[test]
    fn test_insertion_shifts_are_found() {
        // One inserted byte shifts every following block
        let delta = generate_delta(&sig(b"AAAABBBBCCCCDDDD", 4), b"AAAAxBBBBCCCCDDDD").unwrap();

        assert_eq!(
            delta.ops,
            vec![
                DeltaOp::Copy { index: 0 },
                DeltaOp::Data(b"x".to_vec()),
                DeltaOp::Copy { index: 1 },
                DeltaOp::Copy { index: 2 },
                DeltaOp::Copy { index: 3 },
            ]
        );
    }

    #[test]
    fn test_unmatched_bytes_are_coalesced() {
        let delta = generate_delta(&sig(b"AAAABBBB", 4), b"0123456789AAAA").unwrap();

        assert_eq!(
            delta.ops,
            vec![
                DeltaOp::Data(b"0123456789".to_vec()),
                DeltaOp::Copy { index: 0 },
            ]
        );
    }

    #[test]
    fn test_no_adjacent_literal_ops() {
        let old: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
        let mut new = old.clone();
        new[100] ^= 0xFF;
        new[2000] ^= 0xFF;
        new.extend_from_slice(b"trailing garbage");

        let delta = generate_delta(&sig(&old, 64), &new).unwrap();
        for pair in delta.ops.windows(2) {
            assert!(
                !matches!(pair, [DeltaOp::Data(_), DeltaOp::Data(_)]),
                "adjacent literal ops: {:?}",
                pair
            );
        }
    }

    #[test]
    fn test_short_tail_block_matches_end() {
        // Base: one full block + 2-byte tail "ZZ"
        let delta = generate_delta(&sig(b"AAAAZZ", 4), b"qAAAAZZ").unwrap();
        assert_eq!(
            delta.ops,
            vec![
                DeltaOp::Data(b"q".to_vec()),
                DeltaOp::Copy { index: 0 },
                DeltaOp::Copy { index: 1 },
            ]
        );
    }

    #[test]
    fn test_input_shorter_than_block() {
        // Base shorter than one block: its only block is short
        let delta = generate_delta(&sig(b"abc", 16), b"abc").unwrap();
        assert_eq!(delta.ops, vec![DeltaOp::Copy { index: 0 }]);

        let delta = generate_delta(&sig(b"abcdefgh", 16), b"abc").unwrap();
        assert_eq!(delta.ops, vec![DeltaOp::Data(b"abc".to_vec())]);
    }

    #[test]
    fn test_short_tail_matches_only_at_end() {
        // Tail "ZZ" is matched against the last two bytes only
        let delta = generate_delta(&sig(b"AAAAZZ", 4), b"AAAAZZZ").unwrap();
        assert_eq!(
            delta.ops,
            vec![
                DeltaOp::Copy { index: 0 },
                DeltaOp::Data(b"Z".to_vec()),
                DeltaOp::Copy { index: 1 },
            ]
        );
    }

    #[test]
    fn test_empty_inputs() {
        let delta = generate_delta(&sig(b"something", 4), b"").unwrap();
        assert!(delta.ops.is_empty());
        assert_eq!(delta.compression_ratio(), 0.0);

        let delta = generate_delta(&sig(b"", 4), b"new").unwrap();
        assert_eq!(delta.ops, vec![DeltaOp::Data(b"new".to_vec())]);
    }

    #[test]
    fn test_zero_block_size_rejected() {
        let mut signature = sig(b"abcd", 2);
        signature.block_size = 0;
        let err = generate_delta(&signature, b"abcd").unwrap_err();
        assert!(matches!(err, DeltaError::ContractViolation { .. }));
    }

    #[test]
    fn test_duplicate_blocks_first_preference() {
        // Blocks 0 and 1 are identical
        let delta = generate_delta(&sig(b"XXXXXXXX", 4), b"XXXXXXXX").unwrap();
        assert_eq!(
            delta.ops,
            vec![DeltaOp::Copy { index: 0 }, DeltaOp::Copy { index: 0 }]
        );
    }

    #[test]
    fn test_duplicate_blocks_prefer_unused() {
        let options = DeltaOptions {
            match_preference: MatchPreference::PreferUnused,
        };
        let delta = generate_delta_with(&sig(b"XXXXXXXX", 4), b"XXXXXXXXXXXX", &options).unwrap();
        assert_eq!(
            delta.ops,
            vec![
                DeltaOp::Copy { index: 0 },
                DeltaOp::Copy { index: 1 },
                DeltaOp::Copy { index: 0 },
            ]
        );
    }

    #[test]
    fn test_deterministic() {
        let old: Vec<u8> = b"abcd".repeat(64);
        let new: Vec<u8> = b"abcdabXdabcd".repeat(20);
        let signature = sig(&old, 8);

        let first = generate_delta(&signature, &new).unwrap();
        for _ in 0..5 {
            assert_eq!(generate_delta(&signature, &new).unwrap(), first);
        }
    }

    #[test]
    fn test_delta_json_literals_are_base64() {
        let delta = generate_delta(&sig(b"AAAA", 4), b"hi").unwrap();
        let json = serde_json::to_string(&delta).unwrap();
        assert!(json.contains("\"data\":\"aGk=\""), "{}", json);

        let back: Delta = serde_json::from_str(&json).unwrap();
        assert_eq!(back, delta);
    }
}
