use std::cell::Cell;
use std::hash::{BuildHasher, RandomState};
use std::sync::atomic::{AtomicUsize, Ordering};

const FIXED_STATE: u64 = 0x9a7013f475bb8c23;

/// A fast, non-cryptographic PRNG used to pick a random victim worker to
/// steal from.
pub(crate) struct XorShift64Star {
    state: Cell<u64>,
}

impl XorShift64Star {
    /// A deterministic seed, used for the thread-local default before a
    /// worker binds to a pool and reseeds itself.
    pub(crate) const fn fixed() -> Self {
        XorShift64Star { state: Cell::new(FIXED_STATE) }
    }

    /// Reseeds from a process-wide counter so distinct workers get distinct
    /// sequences even if they bind at the same instant.
    pub(crate) fn random_state(&self) {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let mut seed = 0u64;
        while seed == 0 {
            let count = COUNTER.fetch_add(1, Ordering::Relaxed);
            seed = RandomState::new().hash_one(count);
        }
        self.state.set(seed);
    }

    pub(crate) fn next(&self) -> u64 {
        let mut x = self.state.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state.set(x);
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    /// Returns a uniform random index in `[0, n)`.
    pub(crate) fn next_usize(&self, n: usize) -> usize {
        (self.next() % n as u64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_varying_values() {
        let rng = XorShift64Star::fixed();
        let a = rng.next();
        let b = rng.next();
        assert_ne!(a, b);
    }

    #[test]
    fn bounded_index_in_range() {
        let rng = XorShift64Star::fixed();
        for _ in 0..100 {
            assert!(rng.next_usize(7) < 7);
        }
    }
}
