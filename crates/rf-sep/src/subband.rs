//! Channel-wise subband packing
//!
//! Splits the frequency axis of a `(batch, channels, time, freq)` tensor into
//! `subbands_num` contiguous groups and stacks them on the channel axis:
//!
//! ```text
//! (B, C, T, F)  --analyze-->  (B, C * K, T, F / K)  --synthesize-->  (B, C, T, F)
//! ```
//!
//! Packed channel `c * K + k` holds frequency bins `k * F/K .. (k + 1) * F/K`
//! of input channel `c`. Pure data movement, the round trip is exact.

use ndarray::{Array4, ArrayView4};

use crate::error::{SepError, SepResult};

/// Subband analysis / synthesis with a fixed number of subbands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubbandCodec {
    subbands_num: usize,
}

impl SubbandCodec {
    pub fn new(subbands_num: usize) -> SepResult<Self> {
        if subbands_num == 0 {
            return Err(SepError::InvalidArgument(
                "subbands_num must be at least 1".into(),
            ));
        }

        Ok(Self { subbands_num })
    }

    pub fn subbands_num(&self) -> usize {
        self.subbands_num
    }

    /// Fold frequency bins into extra channels
    pub fn analyze(&self, x: ArrayView4<f32>) -> SepResult<Array4<f32>> {
        let (batch, channels, time_steps, freq_bins) = x.dim();
        let k = self.subbands_num;

        if freq_bins % k != 0 {
            return Err(SepError::NonDivisible {
                what: "frequency bins",
                value: freq_bins,
                divisor: k,
            });
        }

        let sub_bins = freq_bins / k;

        Ok(Array4::from_shape_fn(
            (batch, channels * k, time_steps, sub_bins),
            |(b, packed, t, j)| {
                let (c, band) = (packed / k, packed % k);
                x[[b, c, t, band * sub_bins + j]]
            },
        ))
    }

    /// Unfold subband channels back onto the frequency axis
    pub fn synthesize(&self, packed: ArrayView4<f32>) -> SepResult<Array4<f32>> {
        let (batch, packed_channels, time_steps, sub_bins) = packed.dim();
        let k = self.subbands_num;

        if packed_channels % k != 0 {
            return Err(SepError::NonDivisible {
                what: "packed channels",
                value: packed_channels,
                divisor: k,
            });
        }

        let channels = packed_channels / k;

        Ok(Array4::from_shape_fn(
            (batch, channels, time_steps, sub_bins * k),
            |(b, c, t, f)| {
                let (band, j) = (f / sub_bins, f % sub_bins);
                packed[[b, c * k + band, t, j]]
            },
        ))
    }
}
