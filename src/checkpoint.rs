//! Checkpoint persistence for network parameters.
//!
//! A checkpoint is one bincode-encoded [`ParameterSet`]. Every failure is
//! reported as [`DqnError::Persistence`] naming the offending path, so the
//! training loop can decide whether to log it or abort.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::{ArrayViewD, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{DqnError, Result};
use crate::parameters::ParameterSet;

/// Where checkpoints go and how they come back.
pub trait CheckpointStore {
    fn save(&self, params: &ParameterSet, path: &Path) -> Result<()>;

    fn load(&self, path: &Path) -> Result<ParameterSet>;
}

/// Stores each checkpoint as a bincode file, creating parent directories.
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeCheckpointStore;

fn persistence(path: &Path, action: &str, err: impl std::fmt::Display) -> DqnError {
    DqnError::Persistence(format!("failed to {} {}: {}", action, path.display(), err))
}

impl CheckpointStore for BincodeCheckpointStore {
    fn save(&self, params: &ParameterSet, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| persistence(parent, "create directory", e))?;
            }
        }
        let file = File::create(path).map_err(|e| persistence(path, "create", e))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, params).map_err(|e| persistence(path, "write", e))?;
        writer.flush().map_err(|e| persistence(path, "flush", e))?;
        Ok(())
    }

    fn load(&self, path: &Path) -> Result<ParameterSet> {
        let file = File::open(path).map_err(|e| persistence(path, "open", e))?;
        bincode::deserialize_from(BufReader::new(file)).map_err(|e| persistence(path, "decode", e))
    }
}

/// Checkpoint file for the given environment step.
pub fn checkpoint_path<P: AsRef<Path>>(dir: P, step: usize) -> PathBuf {
    dir.as_ref().join(format!("model-{}.ckpt", step))
}

/// Summary norms of one checkpointed tensor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterNorms {
    pub shape: Vec<usize>,
    /// Maximum absolute row sum, rows taken along the last axis
    pub inf_norm: f32,
    pub frobenius: f32,
}

impl ParameterNorms {
    pub fn of(value: ArrayViewD<f32>) -> Result<Self> {
        let shape = value.shape().to_vec();
        let frobenius = value.iter().map(|x| x * x).sum::<f32>().sqrt();
        let inf_norm = match shape.len() {
            0 | 1 => value.iter().fold(0.0f32, |m, x| m.max(x.abs())),
            _ => {
                let cols = shape[shape.len() - 1];
                let rows = if cols == 0 { 0 } else { value.len() / cols };
                let matrix = value
                    .as_standard_layout()
                    .into_owned()
                    .into_shape((rows, cols))?;
                matrix
                    .axis_iter(Axis(0))
                    .map(|row| row.iter().map(|x| x.abs()).sum::<f32>())
                    .fold(0.0f32, f32::max)
            }
        };
        Ok(ParameterNorms {
            shape,
            inf_norm,
            frobenius,
        })
    }
}

/// Read the tensor `name` from the checkpoint at `path` and report its norms.
pub fn inspect_parameter<S: CheckpointStore + ?Sized>(store: &S, path: &Path, name: &str) -> Result<ParameterNorms> {
    let params = store.load(path)?;
    let param = params.by_name(name).ok_or_else(|| {
        DqnError::Persistence(format!("{} has no tensor named '{}'", path.display(), name))
    })?;
    ParameterNorms::of(param.value.view())
}
