//! Turns a click announced in the server's time base into a local playback instant.
//!
//! A compensation profile holds the measured device values (latency in seconds,
//! gain in dB).  Both are removed: the click is started `delay` earlier and
//! played `gain` dB quieter, so that what comes out of the device lines up with
//! the server's target.
use std::collections::VecDeque;
use std::fmt;

use crate::common::{
    bus_message::{ClickEvent, CompensationProfile},
    clock_sync::ClockEstimate,
};

/// amplitude ratio for a value in dB (1e-3 for -60 dB)
pub fn db_to_lin(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledClick {
    /// seconds, local time base
    pub at_local: f64,
    /// dB after compensation
    pub gain_db: f64,
    /// seconds
    pub duration: f64,
}

impl ScheduledClick {
    pub fn linear_gain(&self) -> f64 {
        db_to_lin(self.gain_db)
    }
}

impl fmt::Display for ScheduledClick {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ at: {:.6}, gain: {:.2} dB, duration: {:.6} }}",
            self.at_local, self.gain_db, self.duration
        )
    }
}

/// A click whose instant already passed after compensation plays right away.
pub fn schedule_click(
    click: &ClickEvent,
    estimate: &ClockEstimate,
    profile: &CompensationProfile,
    now_local: f64,
) -> ScheduledClick {
    let local_time = estimate.to_local(click.target_time);
    ScheduledClick {
        at_local: (local_time - profile.delay).max(now_local),
        gain_db: click.gain - profile.gain,
        duration: click.duration,
    }
}

/// Clicks waiting for their local instant, earliest first
pub struct ClickQueue {
    pending: VecDeque<ScheduledClick>,
}

impl ClickQueue {
    pub fn new() -> ClickQueue {
        ClickQueue {
            pending: VecDeque::new(),
        }
    }
    pub fn push(&mut self, click: ScheduledClick) -> () {
        // clicks normally arrive in order, search from the back
        let pos = self
            .pending
            .iter()
            .rposition(|c| c.at_local <= click.at_local)
            .map(|p| p + 1)
            .unwrap_or(0);
        self.pending.insert(pos, click);
    }
    /// remove and return every click due at `now_local`
    pub fn take_due(&mut self, now_local: f64) -> Vec<ScheduledClick> {
        let mut due = vec![];
        while let Some(c) = self.pending.front() {
            if c.at_local > now_local {
                break;
            }
            if let Some(c) = self.pending.pop_front() {
                due.push(c);
            }
        }
        due
    }
    pub fn next_due(&self) -> Option<f64> {
        self.pending.front().map(|c| c.at_local)
    }
    pub fn len(&self) -> usize {
        self.pending.len()
    }
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
    pub fn clear(&mut self) -> () {
        self.pending.clear();
    }
}
