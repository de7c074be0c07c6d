use std::collections::VecDeque;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent::OptimizationStats;

/// Stores training metrics over time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Loss values over time
    pub losses: VecDeque<f32>,

    /// Gradient norms before clipping
    pub gradient_norms: VecDeque<f32>,

    /// Learning rate over time
    pub learning_rates: VecDeque<f32>,

    /// Epsilon values (for exploration)
    pub epsilons: VecDeque<f32>,

    /// Rewards per episode
    pub episode_rewards: VecDeque<f32>,

    /// Episode lengths
    pub episode_lengths: VecDeque<usize>,
}

fn push_bounded<T>(history: &mut VecDeque<T>, value: T, limit: usize) {
    if limit == 0 {
        return;
    }
    if history.len() >= limit {
        history.pop_front();
    }
    history.push_back(value);
}

/// Tracks metrics during training
#[derive(Debug, Clone)]
pub struct MetricsTracker {
    metrics: TrainingMetrics,
    history_size: usize,

    current_episode_reward: f32,
    current_episode_length: usize,
    episode_count: usize,
    total_steps: usize,
    best_mean_reward: Option<f32>,
}

impl MetricsTracker {
    pub fn new(history_size: usize) -> Self {
        MetricsTracker {
            metrics: TrainingMetrics::default(),
            history_size,
            current_episode_reward: 0.0,
            current_episode_length: 0,
            episode_count: 0,
            total_steps: 0,
            best_mean_reward: None,
        }
    }

    pub fn record_optimization(&mut self, stats: &OptimizationStats) {
        push_bounded(&mut self.metrics.losses, stats.loss, self.history_size);
        push_bounded(&mut self.metrics.gradient_norms, stats.grad_norm, self.history_size);
        push_bounded(&mut self.metrics.learning_rates, stats.learning_rate, self.history_size);
    }

    pub fn record_epsilon(&mut self, epsilon: f32) {
        push_bounded(&mut self.metrics.epsilons, epsilon, self.history_size);
    }

    /// Record a step within an episode
    pub fn step(&mut self, reward: f32) {
        self.current_episode_reward += reward;
        self.current_episode_length += 1;
        self.total_steps += 1;
    }

    /// End the current episode
    pub fn end_episode(&mut self) {
        push_bounded(&mut self.metrics.episode_rewards, self.current_episode_reward, self.history_size);
        push_bounded(&mut self.metrics.episode_lengths, self.current_episode_length, self.history_size);
        self.current_episode_reward = 0.0;
        self.current_episode_length = 0;
        self.episode_count += 1;
    }

    pub fn metrics(&self) -> &TrainingMetrics {
        &self.metrics
    }

    pub fn episode_count(&self) -> usize {
        self.episode_count
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    /// Get recent average loss
    pub fn avg_loss(&self, window: usize) -> Option<f32> {
        mean_of_last(self.metrics.losses.iter().copied(), self.metrics.losses.len(), window)
    }

    /// Get recent average episode reward
    pub fn avg_episode_reward(&self, window: usize) -> Option<f32> {
        let rewards = &self.metrics.episode_rewards;
        mean_of_last(rewards.iter().copied(), rewards.len(), window)
    }

    /// Fold a fresh mean reward into the running best and return the best.
    pub fn update_best_mean_reward(&mut self, mean_reward: f32) -> f32 {
        let best = match self.best_mean_reward {
            Some(best) if best >= mean_reward => best,
            _ => mean_reward,
        };
        self.best_mean_reward = Some(best);
        best
    }

    pub fn best_mean_reward(&self) -> Option<f32> {
        self.best_mean_reward
    }

    /// Save metrics to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::error::Result<()> {
        let serialized = serde_json::to_string_pretty(&self.metrics)?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    /// Load metrics from file
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> crate::error::Result<()> {
        let data = std::fs::read_to_string(path)?;
        self.metrics = serde_json::from_str(&data)?;
        Ok(())
    }
}

/// Mean of the last `window` of `len` values.
pub(crate) fn mean_of_last<I>(values: I, len: usize, window: usize) -> Option<f32>
where
    I: DoubleEndedIterator<Item = f32>,
{
    let n = window.min(len);
    if n == 0 {
        return None;
    }
    let sum: f32 = values.rev().take(n).sum();
    Some(sum / n as f32)
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new(1000)
    }
}
