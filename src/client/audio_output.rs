//! Where clicks end up.  The click renderer hands each one over with the
//! local instant it should sound at.
use std::fs::File;
use std::io::BufWriter;

use hound::{SampleFormat, WavSpec, WavWriter};
use log::info;
use simple_error::bail;

#[cfg(test)]
use mockall::automock;

use crate::common::box_error::BoxError;

#[cfg_attr(test, automock)]
pub trait AudioOutput {
    /// play `samples` scaled by the linear `gain` at `at_local` seconds on the local clock
    fn play(&mut self, samples: &[f32], at_local: f64, gain: f32) -> Result<(), BoxError>;
    /// called once when the client stops
    fn finish(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Only logs the clicks it is given
pub struct LogOutput {
    count: usize,
}

impl LogOutput {
    pub fn new() -> LogOutput {
        LogOutput { count: 0 }
    }
}

impl AudioOutput for LogOutput {
    fn play(&mut self, samples: &[f32], at_local: f64, gain: f32) -> Result<(), BoxError> {
        self.count += 1;
        info!(
            "click {} at {:.6} s, gain {:.4}, {} samples",
            self.count,
            at_local,
            gain,
            samples.len()
        );
        Ok(())
    }
}

/// Renders clicks sample-accurately into a mono wav file whose time line is
/// the local clock.  Silence fills the gaps.
pub struct WavOutput {
    writer: Option<WavWriter<BufWriter<File>>>,
    sample_rate: u32,
    written: u64,
}

impl WavOutput {
    pub fn create(path: &str, sample_rate: u32) -> Result<WavOutput, BoxError> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        Ok(WavOutput {
            writer: Some(WavWriter::create(path, spec)?),
            sample_rate,
            written: 0,
        })
    }
    pub fn samples_written(&self) -> u64 {
        self.written
    }
}

impl AudioOutput for WavOutput {
    fn play(&mut self, samples: &[f32], at_local: f64, gain: f32) -> Result<(), BoxError> {
        let writer = match self.writer.as_mut() {
            Some(w) => w,
            None => bail!("wav output already finished"),
        };
        let start = (at_local.max(0.0) * self.sample_rate as f64).round() as u64;
        // a click that overlaps the previous one starts right after it
        while self.written < start {
            writer.write_sample(0.0f32)?;
            self.written += 1;
        }
        for s in samples {
            writer.write_sample(s * gain)?;
        }
        self.written += samples.len() as u64;
        Ok(())
    }
    fn finish(&mut self) -> Result<(), BoxError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
            info!("wav output: {} samples written", self.written);
        }
        Ok(())
    }
}
