//! # rf-sep: segment-based neural source separation
//!
//! Runs a separation network that only accepts short, fixed-length windows
//! over recordings of any length:
//! - Zero padding and 50%-overlap framing ([`Framer`])
//! - Mini-batched model dispatch over named tensors ([`BatchRunner`])
//! - Centre-keeping reassembly of the separated segments
//! - Channel-wise subband packing for spectrogram models ([`SubbandCodec`])
//! - STFT helpers ([`spectrogram::Stft`]) and an ONNX model backend
//!   ([`OnnxModel`])
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rf_sep::{InferenceConfig, OnnxModel, Separator, SeparatorConfig};
//!
//! let model = OnnxModel::load("models/vocals.onnx", InferenceConfig::default())?;
//! let separator = Separator::new(model, SeparatorConfig::default())?;
//! let vocals = separator.separate(audio.view(), None)?;
//! ```
//!
//! The pipeline is synchronous and batch-only: the whole clip has to be in
//! memory before separation starts.

pub mod batch;
pub mod config;
pub mod framer;
pub mod model;
pub mod separator;
pub mod spectrogram;
pub mod subband;
pub mod waveform;

mod error;
mod inference;

pub use batch::BatchRunner;
pub use config::SeparatorConfig;
pub use error::{SepError, SepResult};
pub use framer::Framer;
pub use inference::{ExecutionProvider, InferenceConfig, InferenceEngine, OnnxModel};
pub use model::{FnModel, SeparationModel, TensorDict};
pub use separator::{separate, Separator};
pub use subband::SubbandCodec;

/// Signal keys shared with exported models
pub mod keys {
    /// Waveform segments `(segments, channels, samples)`
    pub const WAVEFORM: &str = "waveform";

    /// Condition vectors `(segments, condition_dim)`
    pub const CONDITION: &str = "condition";
}

/// Sample rates commonly used by separation models
pub mod sample_rates {
    /// Default model rate
    pub const DEFAULT: u32 = 44100;
}
