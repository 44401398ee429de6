//! Monotonic millisecond clock.
//!
//! The controller works on a wrapping `u32` millisecond counter, like a
//! hardware tick counter. On the host it is derived from
//! `std::time::Instant`.

use std::time::Instant;

pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }

    /// Milliseconds since construction, wrapping at `u32::MAX`.
    pub fn now_ms(&self) -> u32 {
        self.start.elapsed().as_millis() as u32
    }
}
