//! Time sources for request scheduling.
//!
//! The scheduler never reads the wall clock directly; it asks a [`Clock`],
//! so hosts and tests control time. [`SystemClock`] is the production
//! source. [`ManualClock`] is advanced by hand for reproducible scenarios.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic time source consulted once per scheduling decision.
pub trait Clock {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Wall-clock time source used outside of tests and simulations.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for reproducible scheduling scenarios.
///
/// Clones share the same underlying instant, so a test can keep one handle
/// while the scheduler owns another. Time only moves forward.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<Mutex<Instant>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Creates a manual clock starting at the current instant.
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Advances the shared clock by `duration`.
    ///
    /// # Panics
    /// Panics if a holder of the shared clock panicked mid-update.
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.lock().expect("clock lock poisoned");
        *current += duration;
    }
}

impl Clock for ManualClock {
    /// # Panics
    /// Panics if a holder of the shared clock panicked mid-update.
    fn now(&self) -> Instant {
        *self.current.lock().expect("clock lock poisoned")
    }
}
