//! Two way clock synchronisation between a client and the server.
//!
//! The classic four timestamp handshake:
//!
//! | name | when                                  | clock  |
//! |------|---------------------------------------|--------|
//! | T1   | request sent by the client            | client |
//! | T2   | request received by the server        | server |
//! | T3   | reply sent by the server              | server |
//! | T4   | reply received by the client          | client |
//!
//! round trip `d = (T4 - T1) - (T3 - T2)` and offset `t = ((T2 - T1) + (T3 - T4)) / 2`.
//!
//! The offset is server minus client: a server reading converts to the client
//! time line with `server_time - offset`.
//!
//! The server side is [`sync_reply`] and holds no state.  The client side is
//! [`ClockSync`], which keeps the last [`SAMPLE_CAPACITY`] samples and averages
//! the offsets of the [`BEST_SAMPLES`] quickest round trips.
use std::cmp::Ordering;
use std::fmt;

use log::debug;

/// logical size of the circular sample buffer
pub const SAMPLE_CAPACITY: usize = 20;
/// offset is computed only on the quickest round trips
pub const BEST_SAMPLES: usize = 4;
/// probe interval while bootstrapping, in seconds
pub const INTERVAL_INIT: f64 = 0.2;
/// probe interval once the buffer is full, in seconds
pub const INTERVAL_ALIVE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    pub round_trip: f64,
    pub offset: f64,
}

impl TimeSample {
    pub fn from_exchange(t1: f64, t2: f64, t3: f64, t4: f64) -> TimeSample {
        TimeSample {
            round_trip: (t4 - t1) - (t3 - t2),
            offset: ((t2 - t1) + (t3 - t4)) / 2.0,
        }
    }
}

/// Server half of the protocol: echo T1 with the receive and send stamps
pub fn sync_reply(t1: f64, t2: f64, t3: f64) -> [f64; 3] {
    [t1, t2, t3]
}

/// Current estimate of the server clock relative to ours
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockEstimate {
    /// server minus client, seconds
    pub offset: f64,
}

impl ClockEstimate {
    /// server time base to local time base
    pub fn to_local(&self, server_time: f64) -> f64 {
        server_time - self.offset
    }
    /// local time base to server time base
    pub fn to_server(&self, local_time: f64) -> f64 {
        local_time + self.offset
    }
}

/// Client half of the protocol
pub struct ClockSync {
    samples: Vec<TimeSample>,
    next: usize,
    estimate: Option<ClockEstimate>,
    interval_init: f64,
    interval_alive: f64,
}

impl ClockSync {
    pub fn new() -> ClockSync {
        ClockSync::with_intervals(INTERVAL_INIT, INTERVAL_ALIVE)
    }
    pub fn with_intervals(interval_init: f64, interval_alive: f64) -> ClockSync {
        ClockSync {
            samples: Vec::with_capacity(SAMPLE_CAPACITY),
            next: 0,
            estimate: None,
            interval_init,
            interval_alive,
        }
    }

    /// Handle a sync-reply.  `t4` is the local time the reply arrived.
    pub fn handle_reply(&mut self, reply: [f64; 3], t4: f64) -> TimeSample {
        let [t1, t2, t3] = reply;
        let sample = TimeSample::from_exchange(t1, t2, t3, t4);
        self.add_sample(sample);
        sample
    }

    /// store a sample, overwriting the oldest one once full
    pub fn add_sample(&mut self, sample: TimeSample) -> () {
        if self.samples.len() < SAMPLE_CAPACITY {
            self.samples.push(sample);
        } else {
            self.samples[self.next] = sample;
        }
        self.next = (self.next + 1) % SAMPLE_CAPACITY;

        if self.samples.len() >= SAMPLE_CAPACITY {
            let offset = best_offset(&self.samples, BEST_SAMPLES);
            debug!(
                "clock sync: offset {:.6} s from {} samples",
                offset,
                self.samples.len()
            );
            self.estimate = Some(ClockEstimate { offset });
        }
    }

    /// None until the first full buffer: not yet synchronised
    pub fn get_offset(&self) -> Option<f64> {
        self.estimate.map(|e| e.offset)
    }
    pub fn get_estimate(&self) -> Option<ClockEstimate> {
        self.estimate
    }
    pub fn is_synchronized(&self) -> bool {
        self.estimate.is_some()
    }
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
    /// seconds until the next probe should go out
    pub fn probe_interval(&self) -> f64 {
        if self.samples.len() < SAMPLE_CAPACITY {
            self.interval_init
        } else {
            self.interval_alive
        }
    }
}

/// Mean offset of the `best` samples with the smallest round trip.
///
/// Ties on round trip are broken by offset, then by nothing else, so the
/// result does not depend on the order the samples arrived in.
pub fn best_offset(samples: &[TimeSample], best: usize) -> f64 {
    let mut ranked: Vec<TimeSample> = samples.to_vec();
    ranked.sort_by(|a, b| {
        a.round_trip
            .partial_cmp(&b.round_trip)
            .unwrap_or(Ordering::Equal)
            .then(a.offset.partial_cmp(&b.offset).unwrap_or(Ordering::Equal))
    });
    let count = best.min(ranked.len());
    if count == 0 {
        return 0.0;
    }
    ranked.iter().take(count).map(|s| s.offset).sum::<f64>() / count as f64
}

impl fmt::Display for ClockSync {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ samples: {}, offset: {:?}, interval: {} }}",
            self.samples.len(),
            self.get_offset(),
            self.probe_interval()
        )
    }
}
