//! Model interface and batched tensor dictionaries
//!
//! The separator never sees a network directly. Everything it needs from a
//! model is a single forward call mapping a [`TensorDict`] to another one with
//! the same leading (item) length.

use std::collections::BTreeMap;
use std::ops::Range;

use ndarray::{ArrayD, Axis, Slice};

use crate::error::{SepError, SepResult};

/// Ordered mapping from signal key to a batch of tensors
///
/// Axis 0 of every tensor is the item axis. All tensors of a well-formed
/// dictionary share the same item count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TensorDict {
    tensors: BTreeMap<String, ArrayD<f32>>,
}

impl TensorDict {
    /// Create empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tensor, returning the previous one stored under `key`
    pub fn insert(&mut self, key: impl Into<String>, tensor: ArrayD<f32>) -> Option<ArrayD<f32>> {
        self.tensors.insert(key.into(), tensor)
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, tensor: ArrayD<f32>) -> Self {
        self.insert(key, tensor);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ArrayD<f32>> {
        self.tensors.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ArrayD<f32>> {
        self.tensors.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.tensors.contains_key(key)
    }

    /// Keys in sorted order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f32>)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Common item count of all tensors
    ///
    /// The first key (in key order) sets the expected count. Empty
    /// dictionaries hold zero items.
    pub fn item_count(&self) -> SepResult<usize> {
        let mut expected: Option<usize> = None;

        for (key, tensor) in &self.tensors {
            if tensor.ndim() == 0 {
                return Err(SepError::InvalidShape {
                    expected: format!("tensor with an item axis for key '{}'", key),
                    got: "scalar".into(),
                });
            }

            let items = tensor.len_of(Axis(0));
            match expected {
                None => expected = Some(items),
                Some(n) if n != items => {
                    return Err(SepError::LengthMismatch {
                        key: key.clone(),
                        expected: n,
                        got: items,
                    });
                }
                Some(_) => {}
            }
        }

        Ok(expected.unwrap_or(0))
    }

    /// Copy of items `range` of every tensor
    pub fn slice_items(&self, range: Range<usize>) -> SepResult<TensorDict> {
        let mut out = TensorDict::new();

        for (key, tensor) in &self.tensors {
            let items = tensor.len_of(Axis(0));
            if range.start > range.end || range.end > items {
                return Err(SepError::InvalidArgument(format!(
                    "item range {:?} out of bounds for key '{}' with {} items",
                    range, key, items
                )));
            }

            let chunk = tensor
                .slice_axis(Axis(0), Slice::from(range.clone()))
                .to_owned();
            out.insert(key.clone(), chunk);
        }

        Ok(out)
    }
}

impl FromIterator<(String, ArrayD<f32>)> for TensorDict {
    fn from_iter<I: IntoIterator<Item = (String, ArrayD<f32>)>>(iter: I) -> Self {
        Self {
            tensors: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for TensorDict {
    type Item = (String, ArrayD<f32>);
    type IntoIter = std::collections::btree_map::IntoIter<String, ArrayD<f32>>;

    fn into_iter(self) -> Self::IntoIter {
        self.tensors.into_iter()
    }
}

/// Trained separation model, seen as a pure forward function
///
/// `forward` takes `&self`: calling it can't update parameters, so every call
/// is an inference-mode pass.
pub trait SeparationModel: Send + Sync {
    /// Run one mini-batch
    ///
    /// The output must hold the same number of items as the input.
    fn forward(&self, batch: &TensorDict) -> SepResult<TensorDict>;

    /// Model name (for logging)
    fn name(&self) -> &str {
        "model"
    }
}

impl<M: SeparationModel + ?Sized> SeparationModel for &M {
    fn forward(&self, batch: &TensorDict) -> SepResult<TensorDict> {
        (**self).forward(batch)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<M: SeparationModel + ?Sized> SeparationModel for Box<M> {
    fn forward(&self, batch: &TensorDict) -> SepResult<TensorDict> {
        (**self).forward(batch)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Model backed by a plain function or closure
pub struct FnModel<F> {
    name: String,
    func: F,
}

impl<F> FnModel<F>
where
    F: Fn(&TensorDict) -> SepResult<TensorDict> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> SeparationModel for FnModel<F>
where
    F: Fn(&TensorDict) -> SepResult<TensorDict> + Send + Sync,
{
    fn forward(&self, batch: &TensorDict) -> SepResult<TensorDict> {
        (self.func)(batch)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    fn items(n: usize, width: usize) -> ArrayD<f32> {
        Array::from_shape_fn(IxDyn(&[n, width]), |idx| (idx[0] * 10 + idx[1]) as f32)
    }

    #[test]
    fn test_item_count() {
        let dict = TensorDict::new()
            .with("waveform", items(5, 4))
            .with("condition", items(5, 2));
        assert_eq!(dict.item_count().unwrap(), 5);
        assert_eq!(TensorDict::new().item_count().unwrap(), 0);
    }

    #[test]
    fn test_item_count_mismatch() {
        let dict = TensorDict::new()
            .with("condition", items(5, 2))
            .with("waveform", items(4, 4));

        assert!(matches!(
            dict.item_count(),
            Err(SepError::LengthMismatch { ref key, expected: 5, got: 4 }) if key == "waveform"
        ));
    }

    #[test]
    fn test_slice_items() {
        let dict = TensorDict::new().with("waveform", items(5, 3));
        let chunk = dict.slice_items(2..4).unwrap();

        let tensor = chunk.get("waveform").unwrap();
        assert_eq!(tensor.shape(), &[2, 3]);
        assert_eq!(tensor[[0, 0]], 20.0);
        assert_eq!(tensor[[1, 2]], 32.0);

        assert!(dict.slice_items(3..7).is_err());
    }

    #[test]
    fn test_keys_are_ordered() {
        let dict = TensorDict::new()
            .with("waveform", items(1, 1))
            .with("condition", items(1, 1));
        let keys: Vec<&str> = dict.keys().collect();
        assert_eq!(keys, vec!["condition", "waveform"]);
    }

    #[test]
    fn test_fn_model() {
        let model = FnModel::new("identity", |batch: &TensorDict| Ok(batch.clone()));
        let dict = TensorDict::new().with("waveform", items(2, 2));

        assert_eq!(model.name(), "identity");
        assert_eq!(model.forward(&dict).unwrap(), dict);
        assert_eq!((&model).forward(&dict).unwrap(), dict);
    }
}
