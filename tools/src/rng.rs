//! Deterministic random streams for the traffic simulator.
//!
//! RULE: The simulator never touches a platform RNG.
//! Every actor (kiosk, each operator) draws from its own stream, seeded
//! from (master_seed XOR actor_index). A run is reproducible from its seed
//! as far as the operating system's thread scheduling allows.

use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// A named, deterministic RNG for a single simulated actor.
pub struct ActorRng {
    pub name: String,
    inner: Pcg64Mcg,
}

impl ActorRng {
    /// The index must stay stable for a given actor across runs.
    pub fn new(master_seed: u64, actor_index: u64, name: impl Into<String>) -> Self {
        let derived_seed = master_seed ^ (actor_index.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        Self {
            name: name.into(),
            inner: Pcg64Mcg::seed_from_u64(derived_seed),
        }
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Roll a u64 in [0, n).
    pub fn next_u64_below(&mut self, n: u64) -> u64 {
        assert!(n > 0, "n must be > 0");
        self.inner.next_u64() % n
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Pick one element uniformly. None for an empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        items.get(self.next_u64_below(items.len() as u64) as usize)
    }
}

/// Stable actor slots. Operators take `OPERATOR_BASE + n`.
pub const KIOSK_SLOT: u64 = 0;
pub const PEOPLE_SLOT: u64 = 1;
pub const OPERATOR_BASE: u64 = 16;
