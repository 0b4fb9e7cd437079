pub mod rolling;
pub mod checksum;
pub mod generator;
pub mod applier;

pub use rolling::RollingChecksum;
pub use checksum::{
    compute_checksums, generate_signature, generate_signature_from_bytes, strong_checksum,
    BlockChecksum, Signature, STRONG_LEN,
};
pub use generator::{generate_delta, generate_delta_with, Delta, DeltaOp, DeltaOptions, MatchPreference};
pub use applier::{apply_delta, apply_delta_file, apply_delta_from, apply_delta_no_base, apply_delta_to, ApplyStats};

/// Smallest block size picked automatically
pub const MIN_BLOCK_SIZE: usize = 512;
/// Largest block size picked automatically
pub const MAX_BLOCK_SIZE: usize = 128 * 1024;

/// Default block size calculation: sqrt(filesize)
/// Capped between 512 bytes and 128KB
pub fn recommended_block_size(file_size: u64) -> usize {
    let size = (file_size as f64).sqrt() as usize;
    size.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE)
}

/// Share of the target carried as literal bytes, in [0, 1]
///
/// 0.0 means the file was rebuilt entirely from base blocks, 1.0 means
/// nothing matched. An empty target counts as 0.0.
pub fn calculate_delta_efficiency(delta: &Delta) -> f64 {
    delta.compression_ratio()
}
