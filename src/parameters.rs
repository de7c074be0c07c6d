use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

use crate::error::{DqnError, Result};

/// A single named tensor of a network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: ArrayD<f32>,
    /// Frozen parameters never receive optimizer updates
    pub trainable: bool,
}

/// Ordered collection of named tensors.
///
/// Networks own their parameters through one of these; gradients are
/// returned in a set with the same layout, and checkpoints serialize it
/// directly.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    params: Vec<Parameter>,
}

impl ParameterSet {
    pub fn new() -> Self {
        ParameterSet { params: Vec::new() }
    }

    /// Append a tensor and return its index.
    pub fn push<S: Into<String>>(&mut self, name: S, value: ArrayD<f32>, trainable: bool) -> usize {
        self.params.push(Parameter {
            name: name.into(),
            value,
            trainable,
        });
        self.params.len() - 1
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.params.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Parameter> {
        self.params.iter_mut()
    }

    pub fn get(&self, idx: usize) -> &ArrayD<f32> {
        &self.params[idx].value
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut ArrayD<f32> {
        &mut self.params[idx].value
    }

    pub fn is_trainable(&self, idx: usize) -> bool {
        self.params[idx].trainable
    }

    pub fn by_name(&self, name: &str) -> Option<&Parameter> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    /// Total number of scalar entries.
    pub fn num_elements(&self) -> usize {
        self.params.iter().map(|p| p.value.len()).sum()
    }

    /// Zero-filled set with the same names, shapes and flags.
    pub fn zeros_like(&self) -> ParameterSet {
        ParameterSet {
            params: self
                .params
                .iter()
                .map(|p| Parameter {
                    name: p.name.clone(),
                    value: ArrayD::zeros(p.value.raw_dim()),
                    trainable: p.trainable,
                })
                .collect(),
        }
    }

    /// Overwrite every tensor with the matching tensor of `src`.
    ///
    /// Both sets must have the same names in the same order with the same
    /// shapes; nothing is written unless the whole layout matches.
    pub fn copy_from(&mut self, src: &ParameterSet) -> Result<()> {
        if self.params.len() != src.params.len() {
            return Err(DqnError::dimension_mismatch(
                format!("{} parameters", self.params.len()),
                format!("{} parameters", src.params.len()),
            ));
        }
        for (dst, src) in self.params.iter().zip(src.params.iter()) {
            if dst.name != src.name || dst.value.shape() != src.value.shape() {
                return Err(DqnError::dimension_mismatch(
                    format!("{} {:?}", dst.name, dst.value.shape()),
                    format!("{} {:?}", src.name, src.value.shape()),
                ));
            }
        }
        for (dst, src) in self.params.iter_mut().zip(src.params.iter()) {
            dst.value.assign(&src.value);
        }
        Ok(())
    }

    /// L2 norm over every entry of every tensor.
    pub fn global_norm(&self) -> f32 {
        self.params
            .iter()
            .map(|p| p.value.iter().map(|&x| x * x).sum::<f32>())
            .sum::<f32>()
            .sqrt()
    }

    pub fn scale(&mut self, factor: f32) {
        for p in &mut self.params {
            p.value.mapv_inplace(|x| x * factor);
        }
    }

    pub fn is_finite(&self) -> bool {
        self.params
            .iter()
            .all(|p| p.value.iter().all(|x| x.is_finite()))
    }
}
