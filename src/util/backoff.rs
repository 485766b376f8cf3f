//! Backoff for spinning workers polling an empty queue.

use std::hint::spin_loop;
use std::thread;

/// Exponential spin that degrades to `yield_now`, never to a sleep.
///
/// A spinning worker must keep its thread runnable, so unlike a general
/// purpose backoff this one has no parking phase.
#[derive(Debug, Default)]
pub struct SpinBackoff {
    step: u32,
}

impl SpinBackoff {
    const SPIN_LIMIT: u32 = 6;

    pub fn new() -> Self {
        Self { step: 0 }
    }

    pub fn spin(&mut self) {
        if self.step <= Self::SPIN_LIMIT {
            for _ in 0..(1u32 << self.step) {
                spin_loop();
            }
            self.step += 1;
        } else {
            thread::yield_now();
        }
    }

    pub fn reset(&mut self) {
        self.step = 0;
    }

    /// True once the spin phase is exhausted and every round yields.
    pub fn is_yielding(&self) -> bool {
        self.step > Self::SPIN_LIMIT
    }
}
