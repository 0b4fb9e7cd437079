use std::io::{self, Read, Write};
use std::str::FromStr;

/// Zstd frame magic number
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];
/// LZ4 block output is not self-describing, so we tag it
const LZ4_TAG: &[u8; 4] = b"DSL4";

/// Compression applied to serialized delta payloads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Compression {
    #[default]
    None,
    /// LZ4: 23 GB/s, lower compression ratio (good for low-CPU scenarios)
    Lz4,
    /// Zstd level 3: 8.7 GB/s, better compression ratio
    Zstd,
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "lz4" => Ok(Self::Lz4),
            "zstd" => Ok(Self::Zstd),
            _ => Err(format!("Unknown compression type: {}", s)),
        }
    }
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }

    /// Identify the compression of a payload written by `compress`
    pub fn detect(data: &[u8]) -> Self {
        if data.starts_with(&ZSTD_MAGIC) {
            Self::Zstd
        } else if data.starts_with(LZ4_TAG) {
            Self::Lz4
        } else {
            Self::None
        }
    }
}

/// Compress data
pub fn compress(data: &[u8], compression: Compression) -> io::Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Lz4 => compress_lz4(data),
        Compression::Zstd => compress_zstd(data),
    }
}

/// Decompress data
pub fn decompress(data: &[u8], compression: Compression) -> io::Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(data.to_vec()),
        Compression::Lz4 => decompress_lz4(data),
        Compression::Zstd => decompress_zstd(data),
    }
}

/// Decompress whatever `Compression::detect` recognizes
pub fn decompress_auto(data: &[u8]) -> io::Result<Vec<u8>> {
    decompress(data, Compression::detect(data))
}

fn compress_lz4(data: &[u8]) -> io::Result<Vec<u8>> {
    let body = lz4_flex::compress_prepend_size(data);
    let mut out = Vec::with_capacity(LZ4_TAG.len() + body.len());
    out.extend_from_slice(LZ4_TAG);
    out.extend_from_slice(&body);
    Ok(out)
}

fn decompress_lz4(data: &[u8]) -> io::Result<Vec<u8>> {
    let body = data.strip_prefix(LZ4_TAG.as_slice()).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "missing LZ4 payload tag")
    })?;
    lz4_flex::decompress_size_prepended(body)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

fn compress_zstd(data: &[u8]) -> io::Result<Vec<u8>> {
    // Level 3: 8.7 GB/s throughput, optimal balance
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    encoder.finish()
}

fn decompress_zstd(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut result = Vec::new();
    decoder.read_to_end(&mut result)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_decompress_lz4() {
        let original = b"Hello, world! This is a test of LZ4 compression. ".repeat(100);
        let compressed = compress(&original, Compression::Lz4).unwrap();
        let decompressed = decompress(&compressed, Compression::Lz4).unwrap();

        assert_eq!(original.as_slice(), decompressed.as_slice());
        assert!(compressed.len() < original.len());
    }

    #[test]
    fn test_compress_decompress_zstd() {
        let original = b"Hello, world! This is a test of Zstd compression. ".repeat(100);
        let compressed = compress(&original, Compression::Zstd).unwrap();
        let decompressed = decompress(&compressed, Compression::Zstd).unwrap();

        assert_eq!(original.as_slice(), decompressed.as_slice());
        assert!(compressed.len() < original.len());
    }

    #[test]
    fn test_detect() {
        let json = br#"{"block_size":4,"target_size":0,"ops":[]}"#;
        assert_eq!(Compression::detect(json), Compression::None);

        for compression in [Compression::None, Compression::Lz4, Compression::Zstd] {
            let packed = compress(json, compression).unwrap();
            assert_eq!(Compression::detect(&packed), compression);
            assert_eq!(decompress_auto(&packed).unwrap(), json);
        }
    }

    #[test]
    fn test_lz4_without_tag_rejected() {
        let raw = lz4_flex::compress_prepend_size(b"untagged");
        assert!(decompress(&raw, Compression::Lz4).is_err());
    }

    #[test]
    fn test_roundtrip_empty_data() {
        let empty: &[u8] = &[];
        for compression in [Compression::None, Compression::Lz4, Compression::Zstd] {
            let compressed = compress(empty, compression).unwrap();
            let decompressed = decompress(&compressed, compression).unwrap();
            assert_eq!(decompressed.as_slice(), empty);
        }
    }

    #[test]
    fn test_parse() {
        assert_eq!("ZSTD".parse::<Compression>().unwrap(), Compression::Zstd);
        assert!("brotli".parse::<Compression>().is_err());
    }
}
