//! Small deterministic PRNG for program synthesis.
//!
//! A xorshift32 stream is plenty for picking instruction shapes and
//! operand values, and it keeps generated programs fully reproducible from
//! a seed, which is the property the batch generator and the test suite
//! rely on.

/// A seedable xorshift32 generator.
#[derive(Debug, Clone)]
pub struct XorShift32 {
    state: u32,
}

impl XorShift32 {
    /// Create a generator from a seed.
    ///
    /// The seed is scrambled with a Knuth multiplier so that small
    /// consecutive seeds (process ids) produce unrelated streams; zero is
    /// avoided because it is the xorshift fixpoint.
    pub fn new(seed: u64) -> Self {
        let mixed = (seed as u32) ^ ((seed >> 32) as u32);
        Self {
            state: mixed.wrapping_mul(2654435761).max(1),
        }
    }

    /// Next raw 32-bit value.
    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform-ish value in `[0, bound)`. `bound` must be non-zero.
    pub fn below(&mut self, bound: u32) -> u32 {
        self.next_u32() % bound
    }

    /// Uniform-ish value in `[lo, hi]` (inclusive).
    pub fn range_inclusive(&mut self, lo: u32, hi: u32) -> u32 {
        if lo >= hi {
            return lo;
        }
        lo + self.below(hi - lo + 1)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
