//! Random top-layer assignment.
//!
//! Levels follow `floor(-ln(u) / ln(M))` with `u` uniform in `(0, 1]`, so the
//! expected fraction of points on layer `l` shrinks by a factor of `M` per
//! layer. The generator is seeded at construction; the same seed and the same
//! insertion order always yield the same layer assignment.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Seeded generator of per-point top layers.
#[derive(Debug)]
pub(crate) struct LevelGenerator {
    rng: Mutex<StdRng>,
    multiplier: f64,
}

impl LevelGenerator {
    pub(crate) fn new(seed: u64, multiplier: f64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            multiplier,
        }
    }

    /// Draws the next top layer.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub(crate) fn next_level(&self) -> usize {
        // gen::<f64>() is in [0, 1); flip it so ln never sees 0
        let uniform = 1.0 - self.rng.lock().gen::<f64>();
        (-uniform.ln() * self.multiplier).floor() as usize
    }
}
