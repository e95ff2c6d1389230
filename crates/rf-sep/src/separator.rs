//! Long-audio separation
//!
//! pad -> slice -> mini-batched model calls -> reassemble -> trim.
//! Either the whole clip is separated or an error is returned, there is no
//! partial output.

use std::time::Instant;

use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis, Ix3};

use crate::batch::BatchRunner;
use crate::config::SeparatorConfig;
use crate::error::{SepError, SepResult};
use crate::framer::Framer;
use crate::keys;
use crate::model::{SeparationModel, TensorDict};

/// Dictionary keys used for one separation
#[derive(Debug, Clone, Copy)]
struct SignalKeys<'a> {
    waveform: &'a str,
    condition: &'a str,
    output: &'a str,
}

impl Default for SignalKeys<'static> {
    fn default() -> Self {
        Self {
            waveform: keys::WAVEFORM,
            condition: keys::CONDITION,
            output: keys::WAVEFORM,
        }
    }
}

/// Separate a `(channels, samples)` waveform with the default signal keys
///
/// The model receives segments under `"waveform"` (and the tiled condition
/// under `"condition"`) and must return separated segments under
/// `"waveform"`. The result has the input's sample count.
pub fn separate<M>(
    waveform: ArrayView2<f32>,
    segment_samples: usize,
    batch_size: usize,
    model: &M,
    condition: Option<ArrayView1<f32>>,
) -> SepResult<Array2<f32>>
where
    M: SeparationModel + ?Sized,
{
    run_pipeline(
        waveform,
        segment_samples,
        batch_size,
        model,
        condition,
        SignalKeys::default(),
    )
}

fn run_pipeline<M>(
    waveform: ArrayView2<f32>,
    segment_samples: usize,
    batch_size: usize,
    model: &M,
    condition: Option<ArrayView1<f32>>,
    keys: SignalKeys<'_>,
) -> SepResult<Array2<f32>>
where
    M: SeparationModel + ?Sized,
{
    let started = Instant::now();
    let (channels, audio_samples) = waveform.dim();

    if channels == 0 || audio_samples == 0 {
        return Err(SepError::InvalidArgument(format!(
            "cannot separate empty audio of shape {:?}",
            waveform.dim()
        )));
    }

    let framer = Framer::new(segment_samples)?;
    let runner = BatchRunner::new(batch_size)?;

    // Catch unreassemblable segment lengths before spending model time
    let padded_samples = audio_samples.div_ceil(segment_samples) * segment_samples;
    let segments_num = framer.segment_count(padded_samples);
    if segments_num > 1 && segment_samples % 4 != 0 {
        return Err(SepError::NonDivisible {
            what: "segment length",
            value: segment_samples,
            divisor: 4,
        });
    }

    let padded = framer.pad(waveform);
    let segments = framer.slice(padded.view())?;
    // (segments_num, channels, segment_samples)

    let mut inputs = TensorDict::new();
    inputs.insert(keys.waveform, segments.into_dyn());

    if let Some(condition) = condition {
        let tiled = Array2::from_shape_fn((segments_num, condition.len()), |(_, j)| condition[j]);
        inputs.insert(keys.condition, tiled.into_dyn());
    }

    let mut outputs = runner.run(model, &inputs)?;

    let separated = outputs.remove(keys.output).ok_or_else(|| {
        SepError::KeyMismatch(format!(
            "model '{}' returned no '{}' output (got {:?})",
            model.name(),
            keys.output,
            outputs.keys().collect::<Vec<_>>()
        ))
    })?;

    let separated = separated
        .into_dimensionality::<Ix3>()
        .map_err(|e| SepError::InvalidShape {
            expected: "(segments, channels, samples) output".into(),
            got: e.to_string(),
        })?;

    if separated.len_of(Axis(2)) != segment_samples {
        return Err(SepError::InvalidShape {
            expected: format!("output segments of {} samples", segment_samples),
            got: format!("{:?}", separated.dim()),
        });
    }

    let reassembled = framer.reassemble(separated.view())?;
    // (channels, padded_samples)

    let output = reassembled.slice(s![.., ..audio_samples]).to_owned();

    log::info!(
        "Separated {} samples x {} channels in {} segments, {:.3} s",
        audio_samples,
        channels,
        segments_num,
        started.elapsed().as_secs_f64()
    );

    Ok(output)
}

/// Separator bound to one model and configuration
pub struct Separator<M> {
    model: M,
    config: SeparatorConfig,
}

impl<M: SeparationModel> Separator<M> {
    /// Create separator, rejecting invalid configurations up front
    pub fn new(model: M, config: SeparatorConfig) -> SepResult<Self> {
        config.validate()?;

        log::debug!(
            "Separator '{}': {} samples per segment, batch size {}",
            model.name(),
            config.segment_samples(),
            config.batch_size
        );

        Ok(Self { model, config })
    }

    pub fn config(&self) -> &SeparatorConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Separate the target source out of `waveform`
    ///
    /// # Arguments
    /// * `waveform` - `(channels, samples)` audio at the configured sample rate
    /// * `condition` - Source-selecting condition vector, required by
    ///   conditional models
    pub fn separate(
        &self,
        waveform: ArrayView2<f32>,
        condition: Option<ArrayView1<f32>>,
    ) -> SepResult<Array2<f32>> {
        if self.config.conditional && condition.is_none() {
            return Err(SepError::InvalidArgument(
                "conditional model needs a condition vector".into(),
            ));
        }

        run_pipeline(
            waveform,
            self.config.segment_samples(),
            self.config.batch_size,
            &self.model,
            condition,
            SignalKeys {
                waveform: &self.config.waveform_key,
                condition: &self.config.condition_key,
                output: &self.config.output_key,
            },
        )
    }

    /// Separate a source selected by name
    ///
    /// Unconditional models always extract the one source they were trained
    /// on, the name is only used for logging.
    pub fn separate_source(
        &self,
        waveform: ArrayView2<f32>,
        source: &str,
    ) -> SepResult<Array2<f32>> {
        if !self.config.conditional {
            log::debug!(
                "Model '{}' is unconditional, separating '{}' without a condition",
                self.model.name(),
                source
            );
            return self.separate(waveform, None);
        }

        let condition = self.config.condition_for(source)?;
        self.separate(waveform, Some(condition.view()))
    }
}
