use std::sync::{Mutex, PoisonError};

use rand::{rngs::OsRng, Rng as _, SeedableRng as _};
use rand_xoshiro::Xoshiro256StarStar;

/// Probabilistic gate deciding whether a metric call is emitted at all.
///
/// Shared by reference across caller threads; the RNG sits behind a mutex since a
/// single draw per metric call is nowhere near contention territory.
pub(crate) struct Sampler {
    rng: Mutex<Xoshiro256StarStar>,
}

impl Sampler {
    /// Creates a sampler seeded from the operating system, so that separate processes
    /// do not share a sampling sequence.
    pub fn new() -> Self {
        let rng = Xoshiro256StarStar::try_from_rng(&mut OsRng)
            .unwrap_or_else(|_| Xoshiro256StarStar::seed_from_u64(0x517c_c1b7_2722_0a95));
        Self { rng: Mutex::new(rng) }
    }

    /// Creates a sampler with a fixed seed, giving a deterministic decision sequence.
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Mutex::new(Xoshiro256StarStar::seed_from_u64(seed)) }
    }

    /// Returns `true` if an event with the given sampling rate should be sent.
    ///
    /// Rates at or above 1 always pass. Below that, a uniform draw in `[0, 100)` is
    /// compared against `rate * 100`, passing the event with probability roughly
    /// `rate`. A rate of exactly 0 is not special-cased and still passes on a draw of
    /// 0, matching the behavior of existing clients.
    pub fn should_send(&self, rate: f64) -> bool {
        if rate >= 1.0 {
            return true;
        }

        let draw = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.random_range(0u32..100)
        };

        !(rate * 100.0 < f64::from(draw))
    }
}
