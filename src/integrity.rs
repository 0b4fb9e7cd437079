use crate::error::{DeltaError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whole-file checksum algorithm
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChecksumType {
    /// xxHash3 64-bit (fast, non-cryptographic)
    #[serde(rename = "xxh3")]
    Fast,
    /// BLAKE3 (cryptographic, default for uploads)
    #[default]
    #[serde(rename = "blake3")]
    Cryptographic,
}

impl ChecksumType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fast => "xxh3",
            Self::Cryptographic => "blake3",
        }
    }

    pub fn compute(&self, data: &[u8]) -> Checksum {
        let bytes = match self {
            Self::Fast => xxhash_rust::xxh3::xxh3_64(data).to_be_bytes().to_vec(),
            Self::Cryptographic => blake3::hash(data).as_bytes().to_vec(),
        };
        Checksum { kind: *self, bytes }
    }
}

impl FromStr for ChecksumType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xxh3" | "fast" => Ok(Self::Fast),
            "blake3" | "cryptographic" => Ok(Self::Cryptographic),
            _ => Err(format!("Unknown checksum type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum {
    pub kind: ChecksumType,
    pub bytes: Vec<u8>,
}

impl Checksum {
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Compare against a declared checksum, bare hex or "algo:hex"
    pub fn matches(&self, declared: &str) -> bool {
        let declared = declared.trim();
        let hex_part = match declared.split_once(':') {
            Some((algo, rest)) => {
                if !algo.eq_ignore_ascii_case(self.kind.as_str()) {
                    return false;
                }
                rest
            }
            None => declared,
        };
        hex_part.eq_ignore_ascii_case(&self.to_hex())
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.to_hex())
    }
}

/// Checksum `data` and require it to equal `expected`
pub fn verify(data: &[u8], expected: &str, kind: ChecksumType) -> Result<Checksum> {
    let actual = kind.compute(data);
    if !actual.matches(expected) {
        return Err(DeltaError::ChecksumMismatch {
            expected: expected.to_string(),
            actual: actual.to_hex(),
        });
    }
    Ok(actual)
}
