use std::{fs::File, io, io::BufWriter, path::Path, time::Duration};

use speedgb_core::{SAMPLE_RATE, Sample};

/// Destination for the core's 2 MHz stereo stream.
pub trait AudioSink {
    fn queue(&mut self, samples: &[Sample]) -> io::Result<()>;

    /// Audio accepted but not yet played.
    fn queued(&self) -> Duration;

    fn finish(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Discards audio, counting what went by.
#[derive(Debug, Default)]
pub struct NullSink {
    pub samples: u64,
}

impl AudioSink for NullSink {
    fn queue(&mut self, samples: &[Sample]) -> io::Result<()> {
        self.samples += samples.len() as u64;
        Ok(())
    }

    fn queued(&self) -> Duration {
        Duration::ZERO
    }
}

/// Writes the raw stream to a 16-bit stereo WAV file at the native rate.
pub struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    volume: f32,
}

impl WavSink {
    pub fn create(path: &Path, volume: f32) -> io::Result<Self> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec).map_err(io::Error::other)?;
        Ok(Self {
            writer: Some(writer),
            volume: volume.clamp(0.0, 1.0),
        })
    }
}

impl AudioSink for WavSink {
    fn queue(&mut self, samples: &[Sample]) -> io::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        for &[left, right] in samples {
            for s in [left, right] {
                let scaled = (f32::from(s) * self.volume) as i16;
                writer.write_sample(scaled).map_err(io::Error::other)?;
            }
        }
        Ok(())
    }

    fn queued(&self) -> Duration {
        Duration::ZERO
    }

    fn finish(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(writer) => writer.finalize().map_err(io::Error::other),
            None => Ok(()),
        }
    }
}
