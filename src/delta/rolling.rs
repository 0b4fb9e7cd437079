/// Rolling weak checksum
///
/// This is the rsync-style weak checksum used for fast block matching.
/// It can be updated incrementally as a window slides through data.
///
/// Two sums are kept modulo a 31-bit prime:
/// - A: sum of all bytes in the window
/// - B: sum of (n-i) * byte[i], each byte weighted by its distance
///   from the trailing edge of the window
///
/// The final checksum is (B << 32) | A, so a change in either sum
/// changes the digest.
///
/// Note: We don't keep the window in memory since the state (a, b)
/// is enough for O(1) rolling updates.
#[derive(Debug, Clone)]
pub struct RollingChecksum {
    a: u64,
    b: u64,
    window: usize,
}

const MOD: u64 = 2_147_483_647; // 2^31 - 1

impl RollingChecksum {
    /// Create a rolling checksum seeded with a full window
    pub fn new(window: &[u8]) -> Self {
        let (a, b) = sums(window);
        Self {
            a,
            b,
            window: window.len(),
        }
    }

    /// Checksum a block from scratch (non-rolling)
    pub fn calculate(data: &[u8]) -> u64 {
        let (a, b) = sums(data);
        (b << 32) | a
    }

    /// Re-seed with a new window, e.g. after jumping past a matched block
    pub fn reset(&mut self, window: &[u8]) {
        let (a, b) = sums(window);
        self.a = a;
        self.b = b;
        self.window = window.len();
    }

    /// Slide the window one byte: remove `old_byte`, add `new_byte`
    ///
    /// O(1) update:
    /// - A_new = (A_old - old_byte + new_byte) mod M
    /// - B_new = (B_old - n * old_byte + A_new) mod M
    pub fn roll(&mut self, old_byte: u8, new_byte: u8) {
        let old = old_byte as u64;
        let new = new_byte as u64;
        let n_old = (self.window as u64 % MOD) * old % MOD;

        // Add MOD before subtracting to stay non-negative
        self.a = (self.a + MOD - old + new) % MOD;
        self.b = (self.b + MOD - n_old + self.a) % MOD;
    }

    /// Current checksum value
    pub fn digest(&self) -> u64 {
        (self.b << 32) | self.a
    }

    /// Window length this checksum was seeded with
    pub fn window(&self) -> usize {
        self.window
    }
}

fn sums(data: &[u8]) -> (u64, u64) {
    let mut a: u64 = 0;
    let mut b: u64 = 0;
    for &byte in data {
        a = (a + byte as u64) % MOD;
        b = (b + a) % MOD;
    }
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_basic() {
        let hash = RollingChecksum::calculate(b"hello world");
        assert_ne!(hash, 0);
    }

    #[test]
    fn test_checksum_deterministic() {
        let data = b"test data 123";
        assert_eq!(
            RollingChecksum::calculate(data),
            RollingChecksum::calculate(data)
        );
    }

    #[test]
    fn test_checksum_discriminates_same_length() {
        let a = b"Hello, World!!!";
        let b = b"Goodbye, World!";
        assert_eq!(a.len(), b.len());
        assert_ne!(RollingChecksum::calculate(a), RollingChecksum::calculate(b));
    }

    #[test]
    fn test_checksum_order_sensitive() {
        // Same bytes, different order: A matches but B must not
        assert_ne!(
            RollingChecksum::calculate(b"ab"),
            RollingChecksum::calculate(b"ba")
        );
    }

    #[test]
    fn test_checksum_empty() {
        assert_eq!(RollingChecksum::calculate(b""), 0);
    }

    #[test]
    fn test_rolling() {
        let data = b"abcdefghijklmnop";

        let mut hasher = RollingChecksum::new(&data[0..4]); // "abcd"
        let hash1 = hasher.digest();

        hasher.roll(data[0], data[4]); // Remove 'a', add 'e'
        let hash2 = hasher.digest();

        assert_eq!(hash2, RollingChecksum::calculate(&data[1..5])); // "bcde"
        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_rolling_matches_recompute_everywhere() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let block_size = 8;

        let mut hasher = RollingChecksum::new(&data[0..block_size]);

        for i in 1..=(data.len() - block_size) {
            hasher.roll(data[i - 1], data[i + block_size - 1]);
            assert_eq!(
                hasher.digest(),
                RollingChecksum::calculate(&data[i..i + block_size]),
                "Rolling checksum mismatch at position {}",
                i
            );
        }
    }

    #[test]
    fn test_rolling_all_ones() {
        let data = vec![0xFF; 100];
        let block_size = 16;

        let mut hasher = RollingChecksum::new(&data[0..block_size]);
        for i in 1..=(data.len() - block_size) {
            hasher.roll(data[i - 1], data[i + block_size - 1]);
            assert_eq!(
                hasher.digest(),
                RollingChecksum::calculate(&data[i..i + block_size])
            );
        }
    }

    #[test]
    fn test_rolling_large_window() {
        // 128KB window: n * old_byte exceeds the modulus
        let block_size = 128 * 1024;
        let data: Vec<u8> = (0..block_size * 2).map(|i| (i % 251) as u8).collect();

        let mut hasher = RollingChecksum::new(&data[0..block_size]);
        for i in 1..64 {
            hasher.roll(data[i - 1], data[i + block_size - 1]);
        }
        assert_eq!(
            hasher.digest(),
            RollingChecksum::calculate(&data[63..63 + block_size])
        );
    }

    #[test]
    fn test_reset() {
        let data = b"0123456789abcdef";
        let mut hasher = RollingChecksum::new(&data[0..4]);
        hasher.roll(data[0], data[4]);
        hasher.reset(&data[8..14]);

        assert_eq!(hasher.window(), 6);
        assert_eq!(hasher.digest(), RollingChecksum::calculate(&data[8..14]));
    }
}
