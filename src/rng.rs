//! The raw PRNG is an external collaborator per spec.md §1 ("the raw PRNG,
//! treated as a stream of uniform 32-bit integers plus a 'small float in
//! [0,1)'"). This module only pins the *interface* the rest of the engine
//! consumes and a default implementation; it does not specify a particular
//! algorithm beyond picking a fast non-cryptographic generator, matching the
//! teacher's choice of `rand_xoshiro` in its `Cargo.toml`.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

/// Stream of uniform random values the core draws on. Kept as a trait so
/// callers can plug in a deterministic or replay-capable generator in tests.
pub trait FuzzRng {
    /// Uniform value in `0..limit`. Panics if `limit == 0`.
    fn below(&mut self, limit: u32) -> u32;

    /// Uniform value in `0..limit` as usize, for indexing.
    fn below_usize(&mut self, limit: usize) -> usize {
        if limit == 0 {
            return 0;
        }
        self.below(limit as u32) as usize
    }

    /// Raw uniform 32-bit integer.
    fn next_u32(&mut self) -> u32;

    /// Small float in `[0, 1)`.
    fn prob(&mut self) -> f64;

    /// Coin flip with probability `pct` percent of returning true.
    fn chance_pct(&mut self, pct: u32) -> bool {
        self.below(100) < pct
    }
}

/// Default generator: a seedable xoshiro256** stream wrapped behind
/// [`FuzzRng`].
pub struct StdFuzzRng(Xoshiro256StarStar);

impl StdFuzzRng {
    pub fn new(seed: u64) -> Self {
        StdFuzzRng(Xoshiro256StarStar::seed_from_u64(seed))
    }

    pub fn from_entropy() -> Self {
        StdFuzzRng(Xoshiro256StarStar::from_entropy())
    }
}

impl FuzzRng for StdFuzzRng {
    fn below(&mut self, limit: u32) -> u32 {
        assert!(limit > 0, "below() called with limit == 0");
        self.0.gen_range(0..limit)
    }

    fn next_u32(&mut self) -> u32 {
        self.0.gen::<u32>()
    }

    fn prob(&mut self) -> f64 {
        self.0.gen::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_is_bounded() {
        let mut rng = StdFuzzRng::new(1);
        for _ in 0..1000 {
            assert!(rng.below(7) < 7);
        }
    }

    #[test]
    fn prob_is_unit_interval() {
        let mut rng = StdFuzzRng::new(2);
        for _ in 0..1000 {
            let p = rng.prob();
            assert!((0.0..1.0).contains(&p));
        }
    }
}
