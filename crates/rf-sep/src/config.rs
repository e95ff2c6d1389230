//! Separator configuration

use std::path::Path;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{SepError, SepResult};
use crate::{keys, sample_rates};

/// Separator configuration
///
/// Replaces process-wide defaults: everything the pipeline needs besides the
/// model and the audio is carried here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparatorConfig {
    /// Model sample rate in Hz (input audio must already be at this rate)
    pub sample_rate: u32,

    /// Segment length in seconds
    pub segment_seconds: f32,

    /// Segments per model call
    pub batch_size: usize,

    /// Input key for waveform segments
    pub waveform_key: String,

    /// Input key for the per-segment condition vectors
    pub condition_key: String,

    /// Model output key holding separated segments
    pub output_key: String,

    /// Selectable sources, in condition-vector order
    pub sources: Vec<String>,

    /// Model expects a condition vector
    pub conditional: bool,
}

impl Default for SeparatorConfig {
    fn default() -> Self {
        Self {
            sample_rate: sample_rates::DEFAULT,
            segment_seconds: 30.0,
            batch_size: 1,
            waveform_key: keys::WAVEFORM.into(),
            condition_key: keys::CONDITION.into(),
            output_key: keys::WAVEFORM.into(),
            sources: ["drums", "bass", "vocals", "other"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            conditional: false,
        }
    }
}

impl SeparatorConfig {
    /// Short segments, larger batches
    pub fn fast() -> Self {
        Self {
            segment_seconds: 10.0,
            batch_size: 8,
            ..Default::default()
        }
    }

    /// Long segments for more model context
    pub fn high_quality() -> Self {
        Self {
            segment_seconds: 60.0,
            batch_size: 1,
            ..Default::default()
        }
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_segment_seconds(mut self, seconds: f32) -> Self {
        self.segment_seconds = seconds;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    /// Enable conditioning over the given source names
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self.conditional = true;
        self
    }

    /// Segment length in samples
    pub fn segment_samples(&self) -> usize {
        (self.segment_seconds as f64 * self.sample_rate as f64).round() as usize
    }

    /// Check the configuration can drive a full separation
    pub fn validate(&self) -> SepResult<()> {
        if self.sample_rate == 0 {
            return Err(SepError::InvalidArgument("sample rate must be positive".into()));
        }

        if !self.segment_seconds.is_finite() || self.segment_seconds <= 0.0 {
            return Err(SepError::InvalidArgument(format!(
                "segment length must be positive, got {} s",
                self.segment_seconds
            )));
        }

        if self.batch_size == 0 {
            return Err(SepError::InvalidArgument("batch size must be at least 1".into()));
        }

        let segment_samples = self.segment_samples();
        if segment_samples < 4 {
            return Err(SepError::InvalidArgument(format!(
                "segment of {} samples is too short",
                segment_samples
            )));
        }

        // Reassembly cuts segments at quarter boundaries
        if segment_samples % 4 != 0 {
            return Err(SepError::NonDivisible {
                what: "segment samples",
                value: segment_samples,
                divisor: 4,
            });
        }

        for (name, key) in [
            ("waveform_key", &self.waveform_key),
            ("condition_key", &self.condition_key),
            ("output_key", &self.output_key),
        ] {
            if key.is_empty() {
                return Err(SepError::Config(format!("{} must not be empty", name)));
            }
        }

        if self.waveform_key == self.condition_key {
            return Err(SepError::Config(format!(
                "waveform and condition keys must differ, both are '{}'",
                self.waveform_key
            )));
        }

        if self.conditional && self.sources.is_empty() {
            return Err(SepError::Config(
                "conditional model needs at least one source".into(),
            ));
        }

        Ok(())
    }

    /// One-hot condition vector selecting `source`
    pub fn condition_for(&self, source: &str) -> SepResult<Array1<f32>> {
        let idx = self
            .sources
            .iter()
            .position(|s| s.eq_ignore_ascii_case(source))
            .ok_or_else(|| SepError::UnknownSource {
                name: source.to_string(),
                available: self.sources.clone(),
            })?;

        let mut condition = Array1::<f32>::zeros(self.sources.len());
        condition[idx] = 1.0;
        Ok(condition)
    }

    /// Parse configuration from JSON
    pub fn from_json_str(json: &str) -> SepResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> SepResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> SepResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
