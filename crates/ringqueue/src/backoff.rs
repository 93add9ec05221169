use std::hint;

/// Exponential spin-wait for slot-claim contention.
///
/// Doubles the number of PAUSE hints on each step, capped so a single wait
/// stays short. The overall retry budget is owned by the caller (the queue's
/// `max_spin_attempts`), so unlike a general-purpose backoff there is no
/// yield-to-OS phase: producers either win a slot quickly or drop the item.
#[derive(Debug, Default)]
pub struct Backoff {
    step: u32,
}

impl Backoff {
    const STEP_LIMIT: u32 = 6; // 2^6 = 64 PAUSEs per wait, max

    /// Creates a fresh backoff.
    #[inline]
    pub fn new() -> Self {
        Self { step: 0 }
    }

    /// Spins with PAUSE hints, escalating up to the step limit.
    #[inline]
    pub fn spin(&mut self) {
        for _ in 0..(1 << self.step) {
            hint::spin_loop();
        }
        if self.step < Self::STEP_LIMIT {
            self.step += 1;
        }
    }

    /// Resets the escalation for a new wait cycle.
    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}
