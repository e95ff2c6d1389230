//! Mini-batch dispatch
//!
//! Drives a [`SeparationModel`] over a dictionary of N items in chunks of at
//! most `batch_size` items and concatenates the per-key outputs back in item
//! order. Chunks run strictly one after another.

use std::collections::BTreeMap;

use ndarray::{concatenate, ArrayD, ArrayViewD, Axis};

use crate::error::{SepError, SepResult};
use crate::model::{SeparationModel, TensorDict};

/// Runs a model over a [`TensorDict`] in fixed-size mini-batches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRunner {
    batch_size: usize,
}

impl BatchRunner {
    /// Create runner, `batch_size` must be at least 1
    pub fn new(batch_size: usize) -> SepResult<Self> {
        if batch_size == 0 {
            return Err(SepError::InvalidArgument(
                "batch size must be at least 1".into(),
            ));
        }

        Ok(Self { batch_size })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Forward every item of `inputs` through `model`
    ///
    /// Item `i` of every output key corresponds to item `i` of the inputs.
    /// Model errors are returned unchanged and nothing is retried.
    pub fn run<M>(&self, model: &M, inputs: &TensorDict) -> SepResult<TensorDict>
    where
        M: SeparationModel + ?Sized,
    {
        let items = inputs.item_count()?;
        let mut collected: BTreeMap<String, Vec<ArrayD<f32>>> = BTreeMap::new();

        for start in (0..items).step_by(self.batch_size) {
            let end = (start + self.batch_size).min(items);
            log::debug!(
                "Forwarding items {}..{} of {} through '{}'",
                start,
                end,
                items,
                model.name()
            );

            let batch = inputs.slice_items(start..end)?;
            let outputs = model.forward(&batch)?;

            Self::check_outputs(&outputs, &collected, start == 0, end - start)?;

            for (key, tensor) in outputs {
                collected.entry(key).or_default().push(tensor);
            }
        }

        collected
            .into_iter()
            .map(|(key, chunks)| {
                let views: Vec<ArrayViewD<f32>> = chunks.iter().map(|c| c.view()).collect();
                let joined = concatenate(Axis(0), &views).map_err(|e| SepError::InvalidShape {
                    expected: format!("chunks of key '{}' with equal trailing shape", key),
                    got: e.to_string(),
                })?;
                Ok((key, joined))
            })
            .collect()
    }

    /// Validate one chunk's outputs against the chunk length and the keys
    /// seen in earlier chunks
    fn check_outputs(
        outputs: &TensorDict,
        collected: &BTreeMap<String, Vec<ArrayD<f32>>>,
        first_chunk: bool,
        chunk_items: usize,
    ) -> SepResult<()> {
        if outputs.is_empty() {
            return Err(SepError::KeyMismatch("model returned no outputs".into()));
        }

        if !first_chunk {
            let seen: Vec<&str> = collected.keys().map(String::as_str).collect();
            let now: Vec<&str> = outputs.keys().collect();
            if seen != now {
                return Err(SepError::KeyMismatch(format!(
                    "model output keys changed between mini-batches: {:?} then {:?}",
                    seen, now
                )));
            }
        }

        for (key, tensor) in outputs.iter() {
            let got = if tensor.ndim() == 0 {
                0
            } else {
                tensor.len_of(Axis(0))
            };

            if got != chunk_items {
                return Err(SepError::LengthMismatch {
                    key: key.to_string(),
                    expected: chunk_items,
                    got,
                });
            }
        }

        Ok(())
    }
}
