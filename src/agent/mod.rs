//! # DQN learner
//!
//! [`DqnLearner`] owns the online and target Q-networks and performs one
//! optimization step per sampled batch:
//!
//! 1. bootstrap targets `r + gamma * max_a Q_target(s')[a] * (1 - done)`
//! 2. Huber loss between the targets and `Q_online(s)[a]`
//! 3. backprop, global gradient-norm clipping, optimizer update
//! 4. every `target_update_freq` updates, copy online into target
//!
//! The two networks are separately owned; [`copy_parameters`] is the only
//! path that moves weights between them.
//!
//! [`copy_parameters`]: crate::approximator::copy_parameters

mod dqn;

pub use dqn::{bootstrap_targets, DqnLearner, OptimizationStats};
