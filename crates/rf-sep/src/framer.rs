//! Fixed-length framing of long audio
//!
//! Long recordings are zero-padded to a whole number of segments and cut into
//! segments with 50% overlap. After inference the segments are stitched back
//! together, keeping only the centre of every segment:
//!
//! ```text
//! padded:     [=======================]
//! segment 0:  [xxxxxx--]
//! segment 1:        [--xxxx--]
//! segment 2:            [--xxxx--]
//! segment 3:                [--xxxxxx]
//!              x = kept, - = discarded quarter
//! ```
//!
//! The seams are hard cuts at quarter boundaries, no cross-fade is applied.

use ndarray::{concatenate, s, Array2, Array3, ArrayView2, ArrayView3, Axis};

use crate::error::{SepError, SepResult};

/// Pads, slices and reassembles waveforms of shape `(channels, samples)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framer {
    segment_samples: usize,
}

impl Framer {
    /// Create framer for the given segment length
    ///
    /// The hop is half a segment, so segments shorter than 2 samples can't
    /// advance and are rejected.
    pub fn new(segment_samples: usize) -> SepResult<Self> {
        if segment_samples < 2 {
            return Err(SepError::InvalidArgument(format!(
                "segment length must be at least 2 samples, got {}",
                segment_samples
            )));
        }

        Ok(Self { segment_samples })
    }

    /// Segment length in samples
    pub fn segment_samples(&self) -> usize {
        self.segment_samples
    }

    /// Hop between segment starts (half a segment)
    pub fn hop_samples(&self) -> usize {
        self.segment_samples / 2
    }

    /// Number of segments `slice` produces for an already padded length
    pub fn segment_count(&self, padded_samples: usize) -> usize {
        if padded_samples < self.segment_samples {
            return 0;
        }
        1 + (padded_samples - self.segment_samples) / self.hop_samples()
    }

    /// Zero-pad the end of every channel up to a multiple of the segment length
    ///
    /// Already aligned input is returned unchanged.
    pub fn pad(&self, waveform: ArrayView2<f32>) -> Array2<f32> {
        let (channels, samples) = waveform.dim();

        let segments_num = samples.div_ceil(self.segment_samples);
        let pad_samples = segments_num * self.segment_samples - samples;

        log::debug!(
            "Padding {} samples with {} zeros ({} segments of {})",
            samples,
            pad_samples,
            segments_num,
            self.segment_samples
        );

        let mut padded = Array2::<f32>::zeros((channels, samples + pad_samples));
        padded.slice_mut(s![.., ..samples]).assign(&waveform);
        padded
    }

    /// Cut a padded waveform into 50%-overlapping segments
    ///
    /// Output shape: `(segments, channels, segment_samples)`.
    pub fn slice(&self, padded: ArrayView2<f32>) -> SepResult<Array3<f32>> {
        let (channels, samples) = padded.dim();

        if samples % self.segment_samples != 0 {
            return Err(SepError::InconsistentLength {
                samples,
                segment_samples: self.segment_samples,
            });
        }

        let hop = self.hop_samples();
        let segments_num = self.segment_count(samples);
        let mut segments = Array3::<f32>::zeros((segments_num, channels, self.segment_samples));

        for (idx, mut segment) in segments.outer_iter_mut().enumerate() {
            let start = idx * hop;
            segment.assign(&padded.slice(s![.., start..start + self.segment_samples]));
        }

        log::debug!(
            "Sliced {} samples into {} segments (hop {})",
            samples,
            segments_num,
            hop
        );

        Ok(segments)
    }

    /// Stitch overlapping segments back into one waveform
    ///
    /// Keeps `[0, 3/4)` of the first segment, `[1/4, 3/4)` of every interior
    /// segment and `[1/4, 1)` of the last one. A single segment is returned
    /// as is.
    pub fn reassemble(&self, segments: ArrayView3<f32>) -> SepResult<Array2<f32>> {
        let (segments_num, _channels, segment_samples) = segments.dim();

        if segments_num == 0 {
            return Err(SepError::InvalidArgument(
                "cannot reassemble an empty segment collection".into(),
            ));
        }

        if segments_num == 1 {
            return Ok(segments.index_axis(Axis(0), 0).to_owned());
        }

        if segment_samples % 4 != 0 {
            return Err(SepError::NonDivisible {
                what: "segment length",
                value: segment_samples,
                divisor: 4,
            });
        }

        let quarter = segment_samples / 4;
        let three_quarters = 3 * quarter;
        let last = segments_num - 1;

        let parts: Vec<ArrayView2<f32>> = segments
            .outer_iter()
            .enumerate()
            .map(|(idx, segment)| match idx {
                0 => segment.slice_move(s![.., ..three_quarters]),
                i if i == last => segment.slice_move(s![.., quarter..]),
                _ => segment.slice_move(s![.., quarter..three_quarters]),
            })
            .collect();

        concatenate(Axis(1), &parts).map_err(|e| SepError::InvalidShape {
            expected: format!("segments of {} samples", segment_samples),
            got: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn ramp(channels: usize, samples: usize) -> Array2<f32> {
        Array::from_shape_fn((channels, samples), |(ch, i)| {
            (ch * 1000 + i) as f32 / 10_000.0
        })
    }

    #[test]
    fn test_rejects_short_segments() {
        assert!(matches!(Framer::new(0), Err(SepError::InvalidArgument(_))));
        assert!(matches!(Framer::new(1), Err(SepError::InvalidArgument(_))));
        assert!(Framer::new(2).is_ok());
    }

    #[test]
    fn test_pad_aligned_is_unchanged() {
        let framer = Framer::new(4).unwrap();
        let audio = ramp(2, 12);

        let padded = framer.pad(audio.view());
        assert_eq!(padded, audio);
    }

    #[test]
    fn test_pad_divisibility() {
        let framer = Framer::new(6).unwrap();

        for samples in 1..40 {
            let padded = framer.pad(ramp(1, samples).view());
            assert_eq!(padded.ncols() % 6, 0, "samples = {}", samples);
            assert!(padded.ncols() >= samples);
            assert!(padded.ncols() < samples + 6);
        }
    }

    #[test]
    fn test_pad_appends_zeros() {
        let framer = Framer::new(4).unwrap();
        let audio = ramp(2, 10);

        let padded = framer.pad(audio.view());
        assert_eq!(padded.dim(), (2, 12));
        assert_eq!(padded.slice(s![.., ..10]), audio);
        assert!(padded.slice(s![.., 10..]).iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_slice_count_and_offsets() {
        let framer = Framer::new(8).unwrap();
        // 5L/2 = 20 samples, padded to 3L = 24
        let padded = framer.pad(ramp(2, 20).view());
        assert_eq!(padded.ncols(), 24);

        let segments = framer.slice(padded.view()).unwrap();
        assert_eq!(segments.dim(), (5, 2, 8));

        for (idx, segment) in segments.outer_iter().enumerate() {
            let start = idx * 4;
            assert_eq!(segment, padded.slice(s![.., start..start + 8]));
        }
    }

    #[test]
    fn test_slice_rejects_unpadded() {
        let framer = Framer::new(4).unwrap();
        let result = framer.slice(ramp(1, 10).view());

        assert!(matches!(
            result,
            Err(SepError::InconsistentLength {
                samples: 10,
                segment_samples: 4
            })
        ));
    }

    #[test]
    fn test_single_segment_round_trip() {
        let framer = Framer::new(6).unwrap();
        let audio = ramp(2, 6);

        let segments = framer.slice(framer.pad(audio.view()).view()).unwrap();
        assert_eq!(segments.len_of(Axis(0)), 1);

        let restored = framer.reassemble(segments.view()).unwrap();
        assert_eq!(restored, audio);
    }

    #[test]
    fn test_reassemble_restores_padded_length() {
        let framer = Framer::new(8).unwrap();

        for samples in [8, 9, 16, 23, 40, 57] {
            let padded = framer.pad(ramp(3, samples).view());
            let segments = framer.slice(padded.view()).unwrap();
            let restored = framer.reassemble(segments.view()).unwrap();

            assert_eq!(restored, padded, "samples = {}", samples);
        }
    }

    #[test]
    fn test_reassemble_keeps_segment_centres() {
        let framer = Framer::new(4).unwrap();
        // Each segment filled with its own index
        let segments = Array3::from_shape_fn((3, 1, 4), |(seg, _, _)| seg as f32);

        let output = framer.reassemble(segments.view()).unwrap();
        assert_eq!(
            output.row(0).to_vec(),
            vec![0.0f32, 0.0, 0.0, 1.0, 1.0, 2.0, 2.0, 2.0]
        );
    }

    #[test]
    fn test_reassemble_rejects_non_quarterable_segments() {
        let framer = Framer::new(6).unwrap();
        let segments = Array3::<f32>::zeros((3, 2, 6));

        assert!(matches!(
            framer.reassemble(segments.view()),
            Err(SepError::NonDivisible { value: 6, divisor: 4, .. })
        ));
    }

    #[test]
    fn test_reassemble_rejects_empty() {
        let framer = Framer::new(4).unwrap();
        let segments = Array3::<f32>::zeros((0, 2, 4));

        assert!(matches!(
            framer.reassemble(segments.view()),
            Err(SepError::InvalidArgument(_))
        ));
    }
}
