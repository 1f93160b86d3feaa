//! Local clocks used by the scheduler and the sync protocol.
//!
//! Each process has its own time base.  Nothing here assumes that two hosts
//! agree on the time; the sync protocol estimates the difference.
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Instant;

/// Source of monotonic microsecond readings for one process
pub trait Clock {
    fn now_micros(&self) -> u128;

    /// the same reading in seconds, which is what goes on the wire
    fn now_secs(&self) -> f64 {
        micros_to_secs(self.now_micros())
    }
}

/// Microseconds since this clock was created
#[derive(Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> MonotonicClock {
        MonotonicClock {
            start: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_micros(&self) -> u128 {
        self.start.elapsed().as_micros()
    }
}

/// A clock that only moves when you tell it to.  Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_micros: u64) -> ManualClock {
        ManualClock {
            now: Arc::new(AtomicU64::new(start_micros)),
        }
    }
    pub fn set(&self, micros: u64) -> () {
        self.now.store(micros, Ordering::SeqCst);
    }
    pub fn advance(&self, micros: u64) -> () {
        self.now.fetch_add(micros, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u128 {
        self.now.load(Ordering::SeqCst) as u128
    }
}

pub fn micros_to_secs(micros: u128) -> f64 {
    micros as f64 / 1_000_000.0
}

/// negative or NaN inputs land on zero
pub fn secs_to_micros(secs: f64) -> u128 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1_000_000.0).round() as u128
    } else {
        0
    }
}

#[cfg(test)]
mod test_clock {
    use super::*;

    #[test]
    fn manual_clock_moves_on_demand() {
        let clock = ManualClock::new(1_000);
        let shared = clock.clone();
        assert_eq!(clock.now_micros(), 1_000);
        shared.advance(500);
        assert_eq!(clock.now_micros(), 1_500);
        clock.set(2_000_000);
        assert_eq!(shared.now_secs(), 2.0);
    }
    #[test]
    fn monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let a = clock.now_micros();
        let b = clock.now_micros();
        assert!(b >= a);
    }
    #[test]
    fn conversions() {
        assert_eq!(micros_to_secs(1_500_000), 1.5);
        assert_eq!(secs_to_micros(0.025), 25_000);
        assert_eq!(secs_to_micros(-1.0), 0);
        assert_eq!(secs_to_micros(f64::NAN), 0);
    }
}
