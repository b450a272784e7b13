//! System tick counting.
//!
//! The scheduler's only notion of time is a monotonically increasing tick
//! counter advanced once per timer interrupt; there is no wall-clock or
//! virtual-runtime accounting here (that belonged to a different scheduling
//! model and has been dropped).

use portable_atomic::{AtomicU64, Ordering};

/// Timer interrupt frequency, in Hz. Also doubles as the MLFQS formula
/// cascade's "one second" boundary.
pub const TICKS_PER_SECOND: u32 = 100;

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Advance the tick counter by one. Called once per timer interrupt, with
/// interrupts disabled.
pub fn tick() -> u64 {
    TICKS.fetch_add(1, Ordering::Relaxed) + 1
}

/// Number of timer ticks since the system started.
pub fn ticks_now() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_is_monotonic() {
        let before = ticks_now();
        let observed = tick();
        assert!(observed > before);
        assert!(ticks_now() >= observed);
    }
}
