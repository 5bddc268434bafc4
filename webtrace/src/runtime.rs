//! Host event-loop abstractions.
//!
//! The tracing layer never blocks and never spawns its own timers. Anything
//! time-related goes through a [`Clock`] (reading wall time) or a [`Timers`]
//! implementation (scheduling a callback on the host's loop), so that a
//! deterministic host can drive the same code in tests.
use std::fmt;
use std::time::{Duration, SystemTime};

/// Source of wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current time.
    fn now(&self) -> SystemTime;
}

/// [`Clock`] backed by [`SystemTime::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Handle returned by [`Timers::set_timeout`], used to cancel the timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Wraps a host-assigned timer number.
    pub const fn new(id: u64) -> Self {
        TimerId(id)
    }

    /// The host-assigned timer number.
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Callback scheduled through [`Timers`].
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// One-shot timers on the host event loop.
///
/// Callbacks run later, on the loop, never inline inside `set_timeout`.
pub trait Timers: Send + Sync + fmt::Debug {
    /// Schedule `callback` to run once after `delay`.
    fn set_timeout(&self, delay: Duration, callback: TimerCallback) -> TimerId;

    /// Cancel a pending timer. Cancelling a timer that already fired or was
    /// already cancelled does nothing.
    fn clear_timeout(&self, id: TimerId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let first = clock.now();
        assert!(clock.now() >= first);
    }

    #[test]
    fn timer_ids_round_trip() {
        assert_eq!(TimerId::new(7).as_u64(), 7);
        assert!(TimerId::new(1) < TimerId::new(2));
    }
}
