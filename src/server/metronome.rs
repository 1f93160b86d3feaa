//! Look-ahead click scheduler.
//!
//! The scheduler wakes every `tick_interval` and announces a click once its
//! target time falls inside the look-ahead window `[now, now + look_ahead_delay)`.
//! Target times advance by exactly one period per click.  When the process
//! stalls past a target, the schedule jumps forward by whole periods to the
//! next future target and the skipped clicks are never emitted.
//!
//! All times are microseconds on the server clock.
use serde_json::Value;
use std::fmt;

use log::{debug, info, warn};

use crate::common::{
    box_error::BoxError,
    bus_message::ClickEvent,
    clock::{micros_to_secs, secs_to_micros},
};
use crate::server::params::ServerParams;

/// default wake cadence, microseconds
pub const DEFAULT_TICK_INTERVAL: u128 = 25_000;

#[derive(Debug, Clone, PartialEq)]
pub struct MetronomeState {
    pub active: bool,
    pub period: u128,
    pub look_ahead_delay: u128,
    /// -1 infinite, > 0 finite, 0 exhausted
    pub remaining: i64,
    pub next_trigger: u128,
    pub tick_interval: u128,
    /// dB
    pub gain: f64,
    /// milliseconds, as control panels set it
    pub duration: f64,
}

/// What one scheduler evaluation produced
#[derive(Debug, Default, PartialEq)]
pub struct TickResult {
    pub clicks: Vec<ClickEvent>,
    /// active flag or remaining count moved
    pub state_changed: bool,
}

pub struct Metronome {
    state: MetronomeState,
    next_wake: Option<u128>,
    /// false until the first activation fixes the phase
    phased: bool,
}

impl Metronome {
    /// Starts inactive whatever `params.active` says; call [`Metronome::activate`].
    pub fn new(params: &ServerParams, tick_interval: u128) -> Metronome {
        let params = params.bounded();
        Metronome {
            state: MetronomeState {
                active: false,
                period: ms_to_micros(params.period).max(1),
                look_ahead_delay: ms_to_micros(params.delay),
                remaining: params.number,
                next_trigger: 0,
                tick_interval: tick_interval.max(1),
                gain: params.gain,
                duration: params.duration,
            },
            next_wake: None,
            phased: false,
        }
    }

    pub fn get_state(&self) -> &MetronomeState {
        &self.state
    }
    pub fn is_active(&self) -> bool {
        self.state.active
    }
    pub fn get_remaining(&self) -> i64 {
        self.state.remaining
    }
    pub fn get_next_trigger(&self) -> u128 {
        self.state.next_trigger
    }
    /// None when no wake-up is pending
    pub fn get_next_wake(&self) -> Option<u128> {
        self.next_wake
    }

    /// public view of the state for control panels
    pub fn params(&self) -> ServerParams {
        ServerParams {
            active: self.state.active,
            delay: micros_to_ms(self.state.look_ahead_delay),
            gain: self.state.gain,
            period: micros_to_ms(self.state.period),
            number: self.state.remaining,
            duration: self.state.duration,
        }
    }

    /// Inactive to Active, with an evaluation due immediately.  Returns false
    /// if nothing changed.
    ///
    /// The first activation puts the first target one look-ahead from now.
    /// Later ones keep that phase: a pending target stays, an old one moves
    /// forward by whole periods to the first target at least one look-ahead
    /// away.  The target never moves backwards.
    pub fn activate(&mut self, now: u128) -> bool {
        if self.state.active || self.state.remaining == 0 {
            return false;
        }
        self.state.active = true;
        let earliest = now.saturating_add(self.state.look_ahead_delay);
        if !self.phased {
            self.state.next_trigger = earliest;
            self.phased = true;
        } else if self.state.next_trigger < earliest {
            let steps = steps_to_reach(earliest - self.state.next_trigger, self.state.period);
            self.state.next_trigger = self
                .state
                .next_trigger
                .saturating_add(steps.saturating_mul(self.state.period));
        }
        self.next_wake = Some(now);
        info!(
            "metronome: active, period {} us, first click at {} us",
            self.state.period, self.state.next_trigger
        );
        true
    }

    /// Active to Inactive, cancelling the pending wake-up.  Clicks already
    /// announced stay announced.
    pub fn deactivate(&mut self) -> bool {
        let changed = self.state.active || self.next_wake.is_some();
        if changed {
            info!("metronome: inactive, remaining {}", self.state.remaining);
        }
        self.state.active = false;
        self.next_wake = None;
        changed
    }

    /// Merge a partial parameter update.  Returns true if anything changed.
    pub fn apply_params(&mut self, raw: &Value, now: u128) -> Result<bool, BoxError> {
        let before = self.params();
        let mut params = before.clone();
        params.merge(raw)?;
        let params = params.bounded();

        self.state.period = ms_to_micros(params.period).max(1);
        self.state.look_ahead_delay = ms_to_micros(params.delay);
        self.state.gain = params.gain;
        self.state.duration = params.duration;
        self.state.remaining = params.number;

        if !params.active || self.state.remaining == 0 {
            self.deactivate();
        } else {
            self.activate(now);
        }
        Ok(self.params() != before)
    }

    /// Run the scheduler if its wake-up is due
    pub fn poll(&mut self, now: u128) -> TickResult {
        match self.next_wake {
            Some(wake) if now >= wake => self.tick(now),
            _ => TickResult::default(),
        }
    }

    /// One scheduler evaluation at `now`
    pub fn tick(&mut self, now: u128) -> TickResult {
        let mut result = TickResult::default();
        if !self.state.active || self.state.remaining == 0 {
            return result;
        }

        let window_end = now.saturating_add(self.state.look_ahead_delay);
        if self.state.next_trigger < window_end {
            if self.state.next_trigger < now {
                // stalled past the trigger: realign on the original phase
                let late = now - self.state.next_trigger;
                let steps = steps_to_reach(late, self.state.period);
                self.state.next_trigger = self
                    .state
                    .next_trigger
                    .saturating_add(steps.saturating_mul(self.state.period));
                warn!(
                    "metronome: {:.3} ms late, skipping {} click(s), next at {} us",
                    late as f64 / 1000.0,
                    steps,
                    self.state.next_trigger
                );
            }
            if self.state.next_trigger < window_end {
                result.clicks.push(self.emit());
                if self.state.remaining >= 0 {
                    result.state_changed = true;
                }
            }
        }

        if self.state.remaining == 0 {
            self.deactivate();
            result.state_changed = true;
        } else {
            self.next_wake = Some(now.saturating_add(self.state.tick_interval));
        }
        result
    }

    fn emit(&mut self) -> ClickEvent {
        if self.state.remaining > 0 {
            self.state.remaining -= 1;
        }
        let click = ClickEvent {
            target_time: micros_to_secs(self.state.next_trigger),
            gain: self.state.gain,
            duration: self.state.duration / 1000.0,
        };
        debug!(
            "metronome: click at {} us, remaining {}",
            self.state.next_trigger, self.state.remaining
        );
        self.state.next_trigger = self.state.next_trigger.saturating_add(self.state.period);
        click
    }
}

/// whole periods needed to cover `gap`, rounded up
fn steps_to_reach(gap: u128, period: u128) -> u128 {
    let period = period.max(1);
    gap / period + u128::from(gap % period != 0)
}

fn ms_to_micros(ms: f64) -> u128 {
    secs_to_micros(ms / 1000.0)
}

fn micros_to_ms(micros: u128) -> f64 {
    micros as f64 / 1000.0
}

impl fmt::Display for Metronome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ active: {}, period: {}, look_ahead: {}, remaining: {}, next_trigger: {}, next_wake: {:?} }}",
            self.state.active,
            self.state.period,
            self.state.look_ahead_delay,
            self.state.remaining,
            self.state.next_trigger,
            self.next_wake
        )
    }
}
