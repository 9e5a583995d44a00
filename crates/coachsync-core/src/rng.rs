//! Random number source used for backoff jitter.
//!
//! In production this wraps the thread-local RNG. Tests inject a seeded or
//! scripted implementation so retry schedules are reproducible.

use rand::Rng;

/// Abstraction over random number generation.
pub trait DeterministicRng: Send + Sync {
    /// Generate a random `u32` in the range `[min, max]` inclusive.
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32;
}

/// RNG backed by `rand`'s thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRng;

impl DeterministicRng for SystemRng {
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32 {
        if max <= min {
            return min;
        }
        rand::rng().random_range(min..=max)
    }
}
