//! # Environments
//!
//! The [`Environment`] trait the training loop drives, composable wrappers
//! in the style of the classic Atari preprocessing stack, and a small pixel
//! game ([`Catch`]) for running the engine without an emulator.

mod catch;
mod wrappers;

use std::collections::HashMap;

use crate::error::Result;
use crate::replay_buffer::Frame;

pub use catch::Catch;
pub use wrappers::{ClipReward, MaxAndSkip, Monitor};

/// Outcome of one environment step
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub frame: Frame,
    pub reward: f32,
    pub done: bool,
    /// Free-form diagnostics, e.g. completed-episode statistics
    pub info: HashMap<String, f64>,
}

impl Step {
    pub fn new(frame: Frame, reward: f32, done: bool) -> Self {
        Step {
            frame,
            reward,
            done,
            info: HashMap::new(),
        }
    }
}

/// Single-agent, discrete-action environment producing pixel frames.
pub trait Environment {
    /// Start a new episode and return its first frame.
    fn reset(&mut self) -> Result<Frame>;

    /// Advance one step. Stepping a finished episode is a precondition violation.
    fn step(&mut self, action: usize) -> Result<Step>;

    fn num_actions(&self) -> usize;

    /// Cumulative counter published under `name`, searched through wrappers.
    fn step_counter(&self, _name: &str) -> Option<usize> {
        None
    }

    /// Rewards of completed episodes, if some layer records them.
    fn episode_rewards(&self) -> Option<&[f32]> {
        None
    }
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    fn reset(&mut self) -> Result<Frame> {
        (**self).reset()
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        (**self).step(action)
    }

    fn num_actions(&self) -> usize {
        (**self).num_actions()
    }

    fn step_counter(&self, name: &str) -> Option<usize> {
        (**self).step_counter(name)
    }

    fn episode_rewards(&self) -> Option<&[f32]> {
        (**self).episode_rewards()
    }
}
