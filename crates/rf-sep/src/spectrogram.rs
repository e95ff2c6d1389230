//! STFT helpers for spectrogram-domain models
//!
//! Not used by the framing pipeline itself. Models that work on magnitude and
//! phase (and optionally subband-packed input, see [`crate::subband`]) build
//! their features with these.
//!
//! Layout follows the usual model convention: `(time_steps, freq_bins)` per
//! signal, `(batch, channels, time_steps, freq_bins)` for batches.

use std::sync::Arc;

use ndarray::{s, Array2, Array4, ArrayView2, ArrayView3};
use num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::error::{SepError, SepResult};

/// Default floor for magnitudes before dividing out the phase
pub const DEFAULT_EPS: f32 = 1e-10;

/// Magnitude, cosine and sine of the phase
pub type MagPhase<A> = (A, A, A);

/// Short-time Fourier transform with a periodic Hann window
pub struct Stft {
    n_fft: usize,
    hop_length: usize,
    center: bool,
    window: Vec<f32>,
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
}

impl std::fmt::Debug for Stft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stft")
            .field("n_fft", &self.n_fft)
            .field("hop_length", &self.hop_length)
            .field("center", &self.center)
            .finish()
    }
}

impl Stft {
    /// Create STFT
    ///
    /// With `center`, signals are reflect-padded by `n_fft / 2` on both sides
    /// so frame `t` is centred on sample `t * hop_length`.
    pub fn new(n_fft: usize, hop_length: usize, center: bool) -> SepResult<Self> {
        if n_fft < 2 {
            return Err(SepError::InvalidArgument(format!(
                "n_fft must be at least 2, got {}",
                n_fft
            )));
        }
        if hop_length == 0 || hop_length > n_fft {
            return Err(SepError::InvalidArgument(format!(
                "hop length must be in 1..={}, got {}",
                n_fft, hop_length
            )));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(n_fft);
        let fft_inverse = planner.plan_fft_inverse(n_fft);

        Ok(Self {
            n_fft,
            hop_length,
            center,
            window: hann_window(n_fft),
            fft_forward,
            fft_inverse,
        })
    }

    pub fn n_fft(&self) -> usize {
        self.n_fft
    }

    pub fn hop_length(&self) -> usize {
        self.hop_length
    }

    /// Bins per frame (`n_fft / 2 + 1`)
    pub fn freq_bins(&self) -> usize {
        self.n_fft / 2 + 1
    }

    /// Frames produced for a signal of `samples` samples
    pub fn frames(&self, samples: usize) -> usize {
        let padded = if self.center {
            samples + 2 * (self.n_fft / 2)
        } else {
            samples
        };

        if padded < self.n_fft {
            0
        } else {
            (padded - self.n_fft) / self.hop_length + 1
        }
    }

    /// Real and imaginary parts, each `(time_steps, freq_bins)`
    pub fn stft(&self, signal: &[f32]) -> SepResult<(Array2<f32>, Array2<f32>)> {
        let padded = if self.center {
            reflect_pad(signal, self.n_fft / 2)?
        } else {
            signal.to_vec()
        };

        let n_frames = self.frames(signal.len());
        if n_frames == 0 {
            return Err(SepError::InvalidArgument(format!(
                "signal of {} samples is shorter than n_fft {}",
                signal.len(),
                self.n_fft
            )));
        }

        let n_bins = self.freq_bins();
        let mut real = Array2::<f32>::zeros((n_frames, n_bins));
        let mut imag = Array2::<f32>::zeros((n_frames, n_bins));

        let mut input_buffer = vec![0.0f32; self.n_fft];
        let mut output_buffer = vec![Complex32::new(0.0, 0.0); n_bins];
        let mut scratch = vec![Complex32::new(0.0, 0.0); self.fft_forward.get_scratch_len()];

        for frame_idx in 0..n_frames {
            let start = frame_idx * self.hop_length;

            for (i, (&sample, &w)) in padded[start..start + self.n_fft]
                .iter()
                .zip(&self.window)
                .enumerate()
            {
                input_buffer[i] = sample * w;
            }

            self.fft_forward
                .process_with_scratch(&mut input_buffer, &mut output_buffer, &mut scratch)
                .map_err(|e| SepError::InvalidArgument(format!("FFT failed: {}", e)))?;

            for (bin, val) in output_buffer.iter().enumerate() {
                real[[frame_idx, bin]] = val.re;
                imag[[frame_idx, bin]] = val.im;
            }
        }

        Ok((real, imag))
    }

    /// Magnitude spectrogram, `sqrt(max(re² + im², eps))`
    pub fn spectrogram(&self, signal: &[f32], eps: f32) -> SepResult<Array2<f32>> {
        let (real, imag) = self.stft(signal)?;
        Ok(magnitude(&real, &imag, eps))
    }

    /// Magnitude plus cosine / sine of the phase
    pub fn spectrogram_phase(&self, signal: &[f32], eps: f32) -> SepResult<MagPhase<Array2<f32>>> {
        let (real, imag) = self.stft(signal)?;
        let mag = magnitude(&real, &imag, eps);
        let cos = &real / &mag;
        let sin = &imag / &mag;
        Ok((mag, cos, sin))
    }

    /// Batched [`Stft::spectrogram_phase`]
    ///
    /// Input `(batch, channels, samples)`, outputs
    /// `(batch, channels, time_steps, freq_bins)`.
    pub fn wav_to_spectrogram_phase(
        &self,
        input: ArrayView3<f32>,
        eps: f32,
    ) -> SepResult<MagPhase<Array4<f32>>> {
        let (batch, channels, samples) = input.dim();
        let shape = (batch, channels, self.frames(samples), self.freq_bins());

        let mut mag = Array4::<f32>::zeros(shape);
        let mut cos = Array4::<f32>::zeros(shape);
        let mut sin = Array4::<f32>::zeros(shape);

        for b in 0..batch {
            for c in 0..channels {
                let signal: Vec<f32> = input.slice(s![b, c, ..]).iter().copied().collect();
                let (m, co, si) = self.spectrogram_phase(&signal, eps)?;

                mag.slice_mut(s![b, c, .., ..]).assign(&m);
                cos.slice_mut(s![b, c, .., ..]).assign(&co);
                sin.slice_mut(s![b, c, .., ..]).assign(&si);
            }
        }

        Ok((mag, cos, sin))
    }

    /// Inverse STFT by weighted overlap-add
    ///
    /// Returns exactly `length` samples.
    pub fn istft(
        &self,
        real: ArrayView2<f32>,
        imag: ArrayView2<f32>,
        length: usize,
    ) -> SepResult<Vec<f32>> {
        if real.dim() != imag.dim() {
            return Err(SepError::InvalidShape {
                expected: format!("imag {:?}", real.dim()),
                got: format!("{:?}", imag.dim()),
            });
        }

        let (n_frames, n_bins) = real.dim();
        if n_bins != self.freq_bins() {
            return Err(SepError::InvalidShape {
                expected: format!("{} freq bins", self.freq_bins()),
                got: format!("{} freq bins", n_bins),
            });
        }

        let full_len = if n_frames == 0 {
            0
        } else {
            self.n_fft + self.hop_length * (n_frames - 1)
        };
        let mut output = vec![0.0f32; full_len];
        let mut window_sum = vec![0.0f32; full_len];

        let mut input_buffer = vec![Complex32::new(0.0, 0.0); n_bins];
        let mut output_buffer = vec![0.0f32; self.n_fft];
        let mut scratch = vec![Complex32::new(0.0, 0.0); self.fft_inverse.get_scratch_len()];
        let norm = 1.0 / self.n_fft as f32;

        for frame_idx in 0..n_frames {
            for bin in 0..n_bins {
                input_buffer[bin] = Complex32::new(real[[frame_idx, bin]], imag[[frame_idx, bin]]);
            }
            // DC and Nyquist of a real signal carry no imaginary part
            input_buffer[0].im = 0.0;
            if self.n_fft % 2 == 0 {
                input_buffer[n_bins - 1].im = 0.0;
            }

            self.fft_inverse
                .process_with_scratch(&mut input_buffer, &mut output_buffer, &mut scratch)
                .map_err(|e| SepError::InvalidArgument(format!("IFFT failed: {}", e)))?;

            let start = frame_idx * self.hop_length;
            for (i, &sample) in output_buffer.iter().enumerate() {
                output[start + i] += sample * norm * self.window[i];
                window_sum[start + i] += self.window[i] * self.window[i];
            }
        }

        for (sample, &sum) in output.iter_mut().zip(&window_sum) {
            if sum > 1e-8 {
                *sample /= sum;
            }
        }

        let offset = if self.center { self.n_fft / 2 } else { 0 };
        let mut signal: Vec<f32> = output.into_iter().skip(offset).take(length).collect();
        signal.resize(length, 0.0);

        Ok(signal)
    }
}

/// Periodic Hann window
pub fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()))
        .collect()
}

fn magnitude(real: &Array2<f32>, imag: &Array2<f32>, eps: f32) -> Array2<f32> {
    ndarray::Zip::from(real)
        .and(imag)
        .map_collect(|&re, &im| (re * re + im * im).max(eps).sqrt())
}

/// Mirror `pad` samples around each end, excluding the edge sample itself
fn reflect_pad(signal: &[f32], pad: usize) -> SepResult<Vec<f32>> {
    if pad == 0 {
        return Ok(signal.to_vec());
    }

    if signal.len() <= pad {
        return Err(SepError::InvalidArgument(format!(
            "reflect padding of {} needs more than {} samples",
            pad,
            signal.len()
        )));
    }

    let n = signal.len();
    let mut padded = Vec::with_capacity(n + 2 * pad);
    padded.extend(signal[1..=pad].iter().rev());
    padded.extend_from_slice(signal);
    padded.extend(signal[n - 1 - pad..n - 1].iter().rev());

    Ok(padded)
}
