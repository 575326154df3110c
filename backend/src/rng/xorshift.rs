//! xorshift64* random stream
//!
//! Fast, deterministic PRNG used for every stochastic draw in a session.
//!
//! # Algorithm
//!
//! xorshift64* is a variant of xorshift that passes TestU01's BigCrush
//! statistical tests. It uses 64-bit state and produces 64-bit output.
//!
//! # Determinism
//!
//! Same seed → same sequence of draws → same simulated population and
//! event history. Replicates in probabilistic sensitivity analysis get
//! their own stream, so no two sessions ever share a cursor.
//!
//! `RngManager` implements [`rand::RngCore`], which lets `rand_distr`
//! distributions sample directly from it.

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Deterministic random stream using xorshift64*
///
/// # Example
/// ```
/// use hemsim_core::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let first = rng.next();
/// let u = rng.next_f64();
/// assert!((0.0..1.0).contains(&u));
/// assert_eq!(rng.draws(), 2);
///
/// let mut replay = RngManager::new(12345);
/// assert_eq!(replay.next(), first);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    /// Seed the stream was created with
    seed: u64,

    /// Internal state (64-bit)
    state: u64,

    /// Number of 64-bit words produced so far
    draws: u64,
}

impl RngManager {
    /// Create a new stream with the given seed
    ///
    /// The seed passes through a SplitMix64 finalizer before it becomes the
    /// state, so consecutive seeds start from unrelated states. A zero
    /// mixed state is mapped to 1 (xorshift state must be non-zero).
    pub fn new(seed: u64) -> Self {
        let mixed = splitmix64(seed);
        let state = if mixed == 0 { 1 } else { mixed };
        Self {
            seed,
            state,
            draws: 0,
        }
    }

    /// Generate next random u64 value
    ///
    /// This advances the internal state and returns a random value.
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        self.draws += 1;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Generate random f64 in range [0.0, 1.0)
    ///
    /// # Example
    /// ```
    /// use hemsim_core::RngManager;
    ///
    /// let mut rng = RngManager::new(12345);
    /// let u = rng.next_f64();
    /// assert!(u >= 0.0 && u < 1.0);
    /// ```
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        // 53 high bits → [0.0, 1.0)
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Seed the stream was created with
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Get current state word (for diagnostics and cursor comparisons)
    pub fn get_state(&self) -> u64 {
        self.state
    }

    /// Number of 64-bit words drawn since creation
    pub fn draws(&self) -> u64 {
        self.draws
    }
}

/// SplitMix64 output function
fn splitmix64(seed: u64) -> u64 {
    let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

impl RngCore for RngManager {
    fn next_u32(&mut self) -> u32 {
        (self.next() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.next()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_seed_converted_to_nonzero() {
        let rng = RngManager::new(0);
        assert_ne!(rng.get_state(), 0, "Zero seed should be converted to 1");
        assert_eq!(rng.seed(), 0);
    }

    #[test]
    fn test_next_f64_in_range() {
        let mut rng = RngManager::new(12345);

        for _ in 0..1000 {
            let val = rng.next_f64();
            assert!(
                (0.0..1.0).contains(&val),
                "next_f64() produced value {} outside [0.0, 1.0)",
                val
            );
        }
    }

    #[test]
    fn test_draw_counter_tracks_words() {
        let mut rng = RngManager::new(7);
        rng.next();
        rng.next_f64();
        rng.next_u32();
        let mut buf = [0u8; 12];
        rng.fill_bytes(&mut buf);
        // 3 single draws + 2 words for 12 bytes
        assert_eq!(rng.draws(), 5);
    }

    #[test]
    fn test_seed_is_mixed_into_state() {
        let a = RngManager::new(1000);
        let b = RngManager::new(1001);
        assert_ne!(a.get_state(), 1000);
        assert_eq!(a.seed(), 1000);
        // Adjacent seeds differ in roughly half of the state bits
        let flipped = (a.get_state() ^ b.get_state()).count_ones();
        assert!(flipped > 16, "only {} bits differ", flipped);
    }

    #[test]
    fn test_rand_core_matches_inherent_stream() {
        let mut a = RngManager::new(99);
        let mut b = RngManager::new(99);
        for _ in 0..10 {
            assert_eq!(a.next(), b.next_u64());
        }
    }
}
