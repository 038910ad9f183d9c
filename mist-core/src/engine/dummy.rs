//! Random cooling-mode walker for offline runs.
//!
//! Lets every binary run against no hardware and no database: the walker
//! replaces the decision function with a Markov-like drift over the mode
//! index. Owned per process, never a global.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::constants::PROFILE_COUNT;

/// Stateful mode walker. Holds the previous index and with 60 % probability
/// keeps it, otherwise drifts by one step with reflective boundaries.
#[derive(Debug)]
pub struct DummyModeWalker {
    prev_mode: usize,
    rng: StdRng,
}

impl DummyModeWalker {
    pub fn new() -> Self {
        Self {
            prev_mode: 0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic walker for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            prev_mode: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn prev_mode(&self) -> usize {
        self.prev_mode
    }

    pub fn set_prev_mode(&mut self, mode: usize) {
        self.prev_mode = mode.min(PROFILE_COUNT - 1);
    }

    /// Advance the walk and return the next mode index.
    pub fn step(&mut self) -> usize {
        let current = self.prev_mode;
        let max_mode = PROFILE_COUNT - 1;

        let next = if self.rng.gen::<f64>() < 0.6 {
            current
        } else if current == 1 {
            // From mode 1, a small chance to fall back to idle; otherwise an
            // even split between climbing and holding.
            if self.rng.gen::<f64>() < 0.1 {
                0
            } else if self.rng.gen::<f64>() < 0.5 {
                (current + 1).min(max_mode)
            } else {
                current
            }
        } else if current == 0 {
            1
        } else if current == max_mode {
            current - 1
        } else if self.rng.gen::<f64>() < 0.5 {
            current + 1
        } else {
            current - 1
        };

        self.prev_mode = next;
        info!("cooling_mode: {} (prev: {})", next, current);
        next
    }
}

impl Default for DummyModeWalker {
    fn default() -> Self {
        Self::new()
    }
}
