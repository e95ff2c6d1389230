//! Waveform layout helpers
//!
//! Audio files hand out interleaved frames, the pipeline works on planar
//! `(channels, samples)` arrays.

use ndarray::{Array2, ArrayView2};

use crate::error::{SepError, SepResult};

/// Deinterleave `[l0, r0, l1, r1, ...]` into `(channels, samples)`
pub fn deinterleave(samples: &[f32], channels: usize) -> SepResult<Array2<f32>> {
    if channels == 0 {
        return Err(SepError::InvalidArgument("channel count must be positive".into()));
    }

    if samples.len() % channels != 0 {
        return Err(SepError::NonDivisible {
            what: "interleaved samples",
            value: samples.len(),
            divisor: channels,
        });
    }

    let frames = samples.len() / channels;
    Ok(Array2::from_shape_fn((channels, frames), |(ch, i)| {
        samples[i * channels + ch]
    }))
}

/// Interleave `(channels, samples)` into one frame-major buffer
pub fn interleave(waveform: ArrayView2<f32>) -> Vec<f32> {
    // Transposed iteration walks frame by frame
    waveform.t().iter().copied().collect()
}

/// What remains of the mix once the separated source is removed
pub fn residual(mix: ArrayView2<f32>, separated: ArrayView2<f32>) -> SepResult<Array2<f32>> {
    if mix.dim() != separated.dim() {
        return Err(SepError::InvalidShape {
            expected: format!("{:?}", mix.dim()),
            got: format!("{:?}", separated.dim()),
        });
    }

    Ok(&mix - &separated)
}
