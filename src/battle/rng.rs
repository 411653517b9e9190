//! Seedable PRNG for battle outcomes. Uses SplitMix64 for throughput and good
//! statistical quality. Deterministic: same seed produces the same sequence.
//! Not cryptographically secure. Randomness is an injected capability: every
//! randomized component takes `&mut Rng`, so tests pin seeds instead of
//! asserting statistically.

const SPLITMIX64_GOLDEN: u64 = 0x9e3779b97f4a7c15;
const SPLITMIX64_M1: u64 = 0xbf58476d1ce4e5b9;
const SPLITMIX64_M2: u64 = 0x94d049bb133111eb;

#[derive(Debug, Clone, Copy)]
pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Seed from OS entropy. Each request gets its own generator, so there is
    /// no shared mutable state between concurrent battles.
    pub fn from_entropy() -> Self {
        let mut seed = [0_u8; 8];
        // getrandom only fails when the OS entropy source is unusable, which
        // leaves nothing sensible to do at this layer.
        getrandom::getrandom(&mut seed).expect("OS entropy source");
        Self::new(u64::from_le_bytes(seed))
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(SPLITMIX64_GOLDEN);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(SPLITMIX64_M1);
        z = (z ^ (z >> 27)).wrapping_mul(SPLITMIX64_M2);
        z ^ (z >> 31)
    }

    /// Uniform in [0, 1) with 53 bits of precision.
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1_u64 << 53) as f64)
    }

    /// Uniform in [0, bound). Rejection-sampled so the result is unbiased.
    pub fn gen_range(&mut self, bound: u64) -> u64 {
        assert!(bound > 0, "gen_range bound must be positive");
        let zone = u64::MAX - (u64::MAX % bound);
        loop {
            let v = self.next_u64();
            if v < zone {
                return v % bound;
            }
        }
    }

    /// Uniform in [0, max], inclusive on both ends.
    #[inline]
    pub fn gen_range_inclusive(&mut self, max: u64) -> u64 {
        if max == u64::MAX {
            self.next_u64()
        } else {
            self.gen_range(max + 1)
        }
    }
}
