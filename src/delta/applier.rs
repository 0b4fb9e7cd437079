use super::{Delta, DeltaOp};
use crate::error::{DeltaError, Result};
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Summary of one delta application
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub operations_count: usize,
    pub copied_bytes: u64,
    pub literal_bytes: u64,
}

impl ApplyStats {
    pub fn bytes_written(&self) -> u64 {
        self.copied_bytes + self.literal_bytes
    }
}

/// Byte range in the base addressed by a Copy op
///
/// A block starting at or beyond the end of the base means the delta
/// was computed against different data.
fn block_range(index: u64, block_size: usize, base_len: u64) -> Result<(u64, usize)> {
    if block_size == 0 {
        return Err(DeltaError::contract("delta block size must be positive"));
    }
    let start = index
        .checked_mul(block_size as u64)
        .filter(|&start| start < base_len)
        .ok_or_else(|| {
            DeltaError::stale(format!(
                "block {} is outside the {}-byte base (block size {})",
                index, base_len, block_size
            ))
        })?;
    let len = (base_len - start).min(block_size as u64) as usize;
    Ok((start, len))
}

fn check_target(stats: &ApplyStats, delta: &Delta) -> Result<()> {
    if stats.bytes_written() != delta.target_size {
        return Err(DeltaError::stale(format!(
            "reconstructed {} bytes, delta expects {}",
            stats.bytes_written(),
            delta.target_size
        )));
    }
    Ok(())
}

/// Upper bound on the bytes `delta` can write against a `base_len`-byte base
///
/// Used for pre-allocation instead of the declared target size, which is
/// untrusted when the delta was read from a file or the wire.
fn output_bound(delta: &Delta, base_len: u64) -> u64 {
    let per_copy = base_len.min(delta.block_size as u64);
    let copies = (delta.copy_count() as u64).saturating_mul(per_copy);
    copies
        .saturating_add(delta.literal_bytes())
        .min(delta.target_size)
}

/// Reconstruct the target file in memory
pub fn apply_delta(old: &[u8], delta: &Delta) -> Result<Vec<u8>> {
    let capacity = usize::try_from(output_bound(delta, old.len() as u64)).unwrap_or(0);
    let mut out = Vec::with_capacity(capacity);
    apply_delta_to(old, delta, &mut out)?;
    Ok(out)
}

/// Reconstruct the target file into `writer`
///
/// On error the writer may already hold a partial reconstruction; the
/// caller must discard it.
pub fn apply_delta_to<W: Write>(old: &[u8], delta: &Delta, writer: &mut W) -> Result<ApplyStats> {
    let mut stats = ApplyStats::default();

    for op in &delta.ops {
        match op {
            DeltaOp::Copy { index } => {
                let (start, len) = block_range(*index, delta.block_size, old.len() as u64)?;
                let start = start as usize;
                writer.write_all(&old[start..start + len])?;
                stats.copied_bytes += len as u64;
            }
            DeltaOp::Data(data) => {
                writer.write_all(data)?;
                stats.literal_bytes += data.len() as u64;
            }
        }
        stats.operations_count += 1;
    }

    check_target(&stats, delta)?;
    Ok(stats)
}

/// Reconstruct from a seekable base without loading it into memory
pub fn apply_delta_from<R: Read + Seek, W: Write>(
    base: &mut R,
    delta: &Delta,
    writer: &mut W,
) -> Result<ApplyStats> {
    let base_len = base.seek(SeekFrom::End(0))?;
    let mut stats = ApplyStats::default();
    // No block is longer than the base itself
    let mut buffer = vec![0u8; base_len.min(delta.block_size as u64) as usize];

    for op in &delta.ops {
        match op {
            DeltaOp::Copy { index } => {
                let (start, len) = block_range(*index, delta.block_size, base_len)?;
                base.seek(SeekFrom::Start(start))?;
                base.read_exact(&mut buffer[..len])
                    .map_err(|e| DeltaError::read(format!("reading base block {}", index), e))?;
                writer.write_all(&buffer[..len])?;
                stats.copied_bytes += len as u64;
            }
            DeltaOp::Data(data) => {
                writer.write_all(data)?;
                stats.literal_bytes += data.len() as u64;
            }
        }
        stats.operations_count += 1;
    }

    check_target(&stats, delta)?;
    Ok(stats)
}

/// Apply a delta to a base file, writing `new_file` atomically
///
/// Output goes to a temp file next to `new_file` and is renamed into
/// place only after the full reconstruction succeeded.
pub fn apply_delta_file(old_file: &Path, delta: &Delta, new_file: &Path) -> Result<ApplyStats> {
    let mut old = File::open(old_file)
        .map_err(|e| DeltaError::read(format!("opening base {}", old_file.display()), e))?;

    let dir = match new_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = tempfile::NamedTempFile::new_in(dir)?;

    let stats = {
        let mut writer = BufWriter::with_capacity(256 * 1024, temp.as_file());
        let stats = apply_delta_from(&mut old, delta, &mut writer)?;
        writer.flush()?;
        stats
    };

    temp.persist(new_file).map_err(|e| DeltaError::Io(e.error))?;

    tracing::debug!(
        base = %old_file.display(),
        output = %new_file.display(),
        ops = stats.operations_count,
        literal_bytes = stats.literal_bytes,
        "Applied delta"
    );
    Ok(stats)
}

/// Apply delta when there's no base (full reconstruction from literals)
pub fn apply_delta_no_base(delta: &Delta) -> Result<Vec<u8>> {
    apply_delta(&[], delta)
}
