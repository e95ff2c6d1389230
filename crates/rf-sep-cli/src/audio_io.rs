//! WAV reading and writing

use std::path::Path;

use anyhow::{Context, Result, bail};
use ndarray::{Array2, ArrayView2};
use rf_sep::waveform;

/// Decoded audio file
#[derive(Debug, Clone)]
pub struct AudioFile {
    /// Samples as `(channels, samples)`
    pub samples: Array2<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AudioFile {
    pub fn channels(&self) -> usize {
        self.samples.nrows()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.ncols() as f64 / self.sample_rate as f64
    }
}

/// Read a WAV file, converting integer PCM to [-1, 1) floats
pub fn read_wav<P: AsRef<Path>>(path: P) -> Result<AudioFile> {
    let path = path.as_ref();
    let reader = hound::WavReader::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let spec = reader.spec();
    if spec.channels == 0 {
        bail!("{}: no channels", path.display());
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("failed to decode {}", path.display()))?,
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()
                .with_context(|| format!("failed to decode {}", path.display()))?
        }
    };

    let samples = waveform::deinterleave(&interleaved, spec.channels as usize)
        .with_context(|| format!("malformed sample data in {}", path.display()))?;

    log::debug!(
        "Read {}: {} channels, {} samples at {} Hz",
        path.display(),
        samples.nrows(),
        samples.ncols(),
        spec.sample_rate
    );

    Ok(AudioFile {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Write `(channels, samples)` audio as 32-bit float WAV
pub fn write_wav<P: AsRef<Path>>(
    path: P,
    samples: ArrayView2<f32>,
    sample_rate: u32,
) -> Result<()> {
    let path = path.as_ref();
    let channels = u16::try_from(samples.nrows())
        .with_context(|| format!("too many channels ({}) for WAV", samples.nrows()))?;

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;

    for sample in waveform::interleave(samples) {
        writer.write_sample(sample)?;
    }
    writer
        .finalize()
        .with_context(|| format!("failed to finalize {}", path.display()))?;

    log::debug!("Wrote {} ({} channels)", path.display(), channels);
    Ok(())
}
