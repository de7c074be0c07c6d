//! Configuration of the [`learn`](crate::trainer::learn) loop.
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
};

use crate::error::{DqnError, Result};

/// Configuration of the training loop.
///
/// Missing YAML fields fall back to [`Default`], which matches the classic
/// Atari DQN setup.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
#[serde(default)]
pub struct LearnConfig {
    /// Number of frames the replay buffer holds.
    pub replay_capacity: usize,

    /// Transitions per optimization step.
    pub batch_size: usize,

    /// Discount factor.
    pub gamma: f32,

    /// Environment steps of random play before optimization starts.
    pub learning_starts: usize,

    /// Environment steps between optimization steps.
    pub learning_freq: usize,

    /// Frames stacked into one observation.
    pub frame_history_len: usize,

    /// Optimization steps between target network synchronizations.
    pub target_update_freq: usize,

    /// Maximum global gradient norm.
    pub grad_norm_clip: f32,

    /// Environment steps between checkpoints.
    pub checkpoint_interval: usize,

    /// Environment steps between progress log lines.
    pub log_interval: usize,

    /// Seed of the run's random number generator.
    pub seed: u64,

    /// Directory checkpoints are written to.
    pub checkpoint_dir: PathBuf,

    /// Checkpoint to initialize both networks from.
    pub restore_path: Option<PathBuf>,

    /// Abort training when a checkpoint cannot be written.
    pub fatal_checkpoint_errors: bool,

    /// Where to export training metrics as JSON when the run ends.
    pub metrics_path: Option<PathBuf>,
}

impl Default for LearnConfig {
    fn default() -> Self {
        Self {
            replay_capacity: 1_000_000,
            batch_size: 32,
            gamma: 0.99,
            learning_starts: 50_000,
            learning_freq: 4,
            frame_history_len: 4,
            target_update_freq: 10_000,
            grad_norm_clip: 10.0,
            checkpoint_interval: 10_000,
            log_interval: 10_000,
            seed: 0,
            checkpoint_dir: PathBuf::from("checkpoints"),
            restore_path: None,
            fatal_checkpoint_errors: false,
            metrics_path: None,
        }
    }
}

fn positive(name: &str, v: usize) -> Result<()> {
    if v == 0 {
        return Err(DqnError::configuration(name, "must be greater than 0"));
    }
    Ok(())
}

impl LearnConfig {
    /// Sets the replay buffer capacity in frames.
    pub fn replay_capacity(mut self, v: usize) -> Self {
        self.replay_capacity = v;
        self
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, v: f32) -> Self {
        self.gamma = v;
        self
    }

    /// Sets the warmup period in environment steps.
    pub fn learning_starts(mut self, v: usize) -> Self {
        self.learning_starts = v;
        self
    }

    /// Sets the interval of optimization in environment steps.
    pub fn learning_freq(mut self, v: usize) -> Self {
        self.learning_freq = v;
        self
    }

    /// Sets the number of stacked frames.
    pub fn frame_history_len(mut self, v: usize) -> Self {
        self.frame_history_len = v;
        self
    }

    /// Sets the interval of target synchronization in optimization steps.
    pub fn target_update_freq(mut self, v: usize) -> Self {
        self.target_update_freq = v;
        self
    }

    /// Sets the gradient norm clip.
    pub fn grad_norm_clip(mut self, v: f32) -> Self {
        self.grad_norm_clip = v;
        self
    }

    /// Sets the interval of checkpointing in environment steps.
    pub fn checkpoint_interval(mut self, v: usize) -> Self {
        self.checkpoint_interval = v;
        self
    }

    /// Sets the interval of progress logging in environment steps.
    pub fn log_interval(mut self, v: usize) -> Self {
        self.log_interval = v;
        self
    }

    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    pub fn checkpoint_dir(mut self, v: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = v.into();
        self
    }

    pub fn restore_path(mut self, v: Option<PathBuf>) -> Self {
        self.restore_path = v;
        self
    }

    pub fn fatal_checkpoint_errors(mut self, v: bool) -> Self {
        self.fatal_checkpoint_errors = v;
        self
    }

    pub fn metrics_path(mut self, v: Option<PathBuf>) -> Self {
        self.metrics_path = v;
        self
    }

    /// Reject settings the training loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        positive("replay_capacity", self.replay_capacity)?;
        positive("batch_size", self.batch_size)?;
        positive("learning_freq", self.learning_freq)?;
        positive("frame_history_len", self.frame_history_len)?;
        positive("target_update_freq", self.target_update_freq)?;
        positive("checkpoint_interval", self.checkpoint_interval)?;
        positive("log_interval", self.log_interval)?;
        if self.batch_size >= self.replay_capacity {
            return Err(DqnError::configuration(
                "batch_size".to_string(),
                format!("{} must be smaller than replay_capacity {}", self.batch_size, self.replay_capacity),
            ));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(DqnError::configuration("gamma".to_string(), format!("{} is outside [0, 1]", self.gamma)));
        }
        if !self.grad_norm_clip.is_finite() || self.grad_norm_clip <= 0.0 {
            return Err(DqnError::configuration("grad_norm_clip", "must be positive and finite"));
        }
        Ok(())
    }

    /// Constructs [`LearnConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let config = serde_yaml::from_reader(rdr)?;
        Ok(config)
    }

    /// Saves [`LearnConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
