//!
//! click sample buffer handed to the audio output
//!
//! The first two samples are the actual click, the rest is fixed noise so a
//! longer duration is still easy to pick out on a recording.

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::client::click_renderer::db_to_lin;

pub const SAMPLE_RATE: u32 = 48_000;
/// level of the noise tail, dB
pub const NOISE_GAIN: f64 = -20.0;
const NOISE_SEED: u64 = 0x5eed;
/// longest buffer ever generated, seconds
pub const MAX_CLICK_SECONDS: f64 = 1.0;

pub struct ClickTrack {
    sample_rate: u32,
    duration: f64,
    buffer: Vec<f32>,
}

impl ClickTrack {
    pub fn new(sample_rate: u32) -> ClickTrack {
        // 2 samples at 44100 Hz
        let duration = 2.0 / 44_100.0;
        ClickTrack {
            sample_rate,
            duration,
            buffer: generate(duration, sample_rate),
        }
    }
    pub fn get_sample_rate(&self) -> u32 {
        self.sample_rate
    }
    pub fn get_duration(&self) -> f64 {
        self.duration
    }
    /// buffer for a click of `duration` seconds, regenerated only when it changes
    pub fn buffer_for(&mut self, duration: f64) -> &[f32] {
        if duration != self.duration {
            self.duration = duration;
            self.buffer = generate(duration, self.sample_rate);
        }
        &self.buffer
    }
}

fn generate(duration: f64, sample_rate: u32) -> Vec<f32> {
    let duration = duration.max(0.0).min(MAX_CLICK_SECONDS);
    let length = ((duration * sample_rate as f64) as usize).max(2);
    let mut buffer = Vec::with_capacity(length);
    buffer.push(1.0);
    buffer.push(-1.0);
    let g = db_to_lin(NOISE_GAIN) as f32;
    let mut rng = StdRng::seed_from_u64(NOISE_SEED);
    while buffer.len() < length {
        buffer.push(g * rng.gen_range(-1.0..1.0));
    }
    buffer
}
