//! Wall-clock sources and the per-session tick clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time in fractional seconds since the Unix epoch.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> f64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    /// Creates a clock reading `now`.
    pub fn new(now: f64) -> Self {
        Self {
            bits: AtomicU64::new(now.to_bits()),
        }
    }

    /// Sets the current reading.
    pub fn set(&self, now: f64) {
        self.bits.store(now.to_bits(), Ordering::SeqCst);
    }

    /// Moves the clock forward by `secs`.
    pub fn advance(&self, secs: f64) {
        self.set(self.now() + secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// Timestamps bracketing the most recent idle period.
///
/// `last_tick` never decreases. Seconds in `(last_tick, current_tick]` are
/// the ones due for the pass in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickClock {
    last_tick: f64,
    current_tick: f64,
}

impl TickClock {
    /// Starts a clock at `now`; nothing is due until time moves past it.
    pub fn new(now: f64) -> Self {
        Self {
            last_tick: now,
            current_tick: now,
        }
    }

    /// End of the last completed pass.
    pub fn last_tick(&self) -> f64 {
        self.last_tick
    }

    /// Time observed at the start of the current pass.
    pub fn current_tick(&self) -> f64 {
        self.current_tick
    }

    /// Records the time at the start of a pass.
    pub fn observe(&mut self, now: f64) {
        self.current_tick = now;
    }

    /// Finishes a pass. A rewound wall clock leaves `last_tick` in place.
    pub fn commit(&mut self) {
        if self.current_tick > self.last_tick {
            self.last_tick = self.current_tick;
        }
    }

    /// Integer seconds `i` with `last_tick < i <= current_tick` and
    /// `i % interval == 0`, ascending.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn due_seconds(&self, interval: u64) -> impl Iterator<Item = u64> + use<> {
        assert!(interval > 0, "interval must be positive");
        let (first, last) = if self.current_tick > self.last_tick && self.current_tick >= 0.0 {
            let low = (self.last_tick.max(-1.0).floor() + 1.0) as u64;
            let high = self.current_tick.floor() as u64;
            (low.div_ceil(interval) * interval, high)
        } else {
            (1, 0)
        };
        (first..=last).step_by(interval as usize)
    }
}
