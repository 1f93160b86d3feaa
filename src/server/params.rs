//! The public metronome parameters as seen by control panels.
//!
//! Control surfaces send whatever their form fields hold, so numbers may come
//! in as strings.  A partial update only touches the keys it names; unknown
//! keys are ignored.
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use simple_error::bail;
use std::fmt;

use log::warn;

use crate::common::box_error::BoxError;

/// shortest period accepted, milliseconds
pub const MIN_PERIOD_MS: f64 = 1.0;
/// longest period and look-ahead accepted, milliseconds (one hour)
pub const MAX_PERIOD_MS: f64 = 3_600_000.0;
pub const MAX_DELAY_MS: f64 = 3_600_000.0;
/// longest click, milliseconds
pub const MAX_DURATION_MS: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerParams {
    pub active: bool,
    /// look-ahead delay, milliseconds
    pub delay: f64,
    /// click gain, dB
    pub gain: f64,
    /// milliseconds
    pub period: f64,
    /// -1 for infinite, > 0 for a finite count
    pub number: i64,
    /// milliseconds (0.05 ms is 2 samples at 44100 Hz)
    pub duration: f64,
}

impl Default for ServerParams {
    fn default() -> ServerParams {
        ServerParams {
            active: true,
            delay: 100.0,
            gain: 0.0,
            period: 1000.0,
            number: -1,
            duration: 0.05,
        }
    }
}

impl ServerParams {
    pub fn as_json(&self) -> Value {
        serde_json::json!({
            "active": self.active,
            "delay": self.delay,
            "gain": self.gain,
            "period": self.period,
            "number": self.number,
            "duration": self.duration,
        })
    }

    /// Merge a full or partial update.  Returns true if any value changed.
    ///
    /// A bad value for a known key is skipped with a warning, the rest of the
    /// update still applies.
    pub fn merge(&mut self, raw: &Value) -> Result<bool, BoxError> {
        let fields = match raw.as_object() {
            Some(f) => f,
            None => bail!("server-params payload is not an object"),
        };
        let before = self.clone();
        for (key, val) in fields {
            let applied = match key.as_str() {
                "active" => as_bool(val).map(|v| self.active = v),
                "delay" => as_f64(val).filter(|v| *v >= 0.0).map(|v| self.delay = v.min(MAX_DELAY_MS)),
                "gain" => as_f64(val).map(|v| self.gain = v),
                "period" => as_f64(val).map(|v| self.period = v.clamp(MIN_PERIOD_MS, MAX_PERIOD_MS)),
                "number" => as_i64(val).map(|v| self.number = v.max(-1)),
                "duration" => as_f64(val)
                    .filter(|v| *v >= 0.0)
                    .map(|v| self.duration = v.min(MAX_DURATION_MS)),
                _ => Some(()),
            };
            if applied.is_none() {
                warn!("server-params: ignoring bad value for {}: {}", key, val);
            }
        }
        Ok(*self != before)
    }

    /// The same values pulled inside the ranges `merge` enforces, for
    /// parameters that come from somewhere else (the settings file)
    pub fn bounded(&self) -> ServerParams {
        ServerParams {
            active: self.active,
            delay: self.delay.clamp(0.0, MAX_DELAY_MS),
            gain: self.gain,
            period: self.period.clamp(MIN_PERIOD_MS, MAX_PERIOD_MS),
            number: self.number.max(-1),
            duration: self.duration.clamp(0.0, MAX_DURATION_MS),
        }
    }
}

fn as_bool(val: &Value) -> Option<bool> {
    match val {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.trim().parse().ok(),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        _ => None,
    }
}

fn as_f64(val: &Value) -> Option<f64> {
    let v = match val {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    v.filter(|f: &f64| f.is_finite())
}

fn as_i64(val: &Value) -> Option<i64> {
    match val {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse().ok().or_else(|| s.parse::<f64>().ok().map(|f| f.round() as i64))
        }
        _ => None,
    }
}

impl fmt::Display for ServerParams {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{{ active: {}, delay: {}, gain: {}, period: {}, number: {}, duration: {} }}",
            self.active, self.delay, self.gain, self.period, self.number, self.duration
        )
    }
}
