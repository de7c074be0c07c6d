//! # pixel-dqn - Deep Q-Network training from raw pixels
//!
//! pixel-dqn trains a value-based agent on environments that emit image
//! frames. It couples a frame-stacking replay buffer, online and target
//! Q-networks kept in sync on a delayed schedule, a gradient-clipped
//! optimizer with scheduled learning rate, and epsilon-greedy exploration.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pixel_dqn::approximator::ModelKind;
//! use pixel_dqn::config::LearnConfig;
//! use pixel_dqn::env::{Catch, Monitor};
//! use pixel_dqn::optimizer::OptimizerSpec;
//! use pixel_dqn::schedule::Schedule;
//! use pixel_dqn::trainer::learn;
//!
//! let mut env = Monitor::new(Catch::new(8, 2, 0).unwrap());
//! let exploration = Schedule::linear(5_000, 1.0, 0.05).unwrap();
//! let optimizer = OptimizerSpec::adam(1e-4, Schedule::constant(1e-3));
//! let config = LearnConfig::default()
//!     .replay_capacity(10_000)
//!     .learning_starts(500)
//!     .target_update_freq(250);
//!
//! let checkpoint = learn(
//!     &mut env,
//!     &ModelKind::Simple { num_filters: 16 },
//!     optimizer,
//!     &exploration,
//!     |_, step| step >= 20_000,
//!     &config,
//! )
//! .unwrap();
//! println!("final checkpoint: {}", checkpoint.display());
//! ```
//!
//! ## Module Organization
//!
//! - [`replay_buffer`] - Frame ring with history stacking and batch sampling
//! - [`schedule`] - Step-indexed schedules for learning rate and exploration
//! - [`approximator`] - Q-network architectures and the factory that builds them
//! - [`agent`] - Online/target learner performing one DQN update per batch
//! - [`optimizer`] - SGD, Adam, and global gradient-norm clipping
//! - [`trainer`] - The `learn` loop
//! - [`env`] - Environment trait, wrappers, and the `Catch` toy game
//! - [`checkpoint`] - Parameter persistence and inspection
//! - [`config`] - `LearnConfig` with YAML load/save
//! - [`presets`] - Classic Atari hyperparameters
//! - [`metrics`] - Training metrics with JSON export
//! - [`error`] - Error types and result handling

pub mod activations;
pub mod agent;
pub mod approximator;
pub mod checkpoint;
pub mod config;
pub mod env;
pub mod error;
pub mod layers;
pub mod loss;
pub mod metrics;
pub mod optimizer;
pub mod parameters;
pub mod presets;
pub mod replay_buffer;
pub mod schedule;
pub mod trainer;

pub use error::{DqnError, Result};
pub use trainer::{learn, learn_with_store};

#[cfg(test)]
mod tests;
