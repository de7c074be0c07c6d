use ndarray::Zip;

use super::{Environment, Step};
use crate::error::{DqnError, Result};
use crate::replay_buffer::Frame;

const DEFAULT_EPISODE_HISTORY: usize = 10_000;

/// Records raw episode statistics before any other wrapper touches them.
///
/// Publishes the total number of raw environment steps as the `"Monitor"`
/// counter, and adds `episode_reward` / `episode_length` to the info of the
/// step that ends an episode. Only the most recent `history` episodes are
/// kept.
#[derive(Clone, Debug)]
pub struct Monitor<E> {
    env: E,
    history: usize,
    total_steps: usize,
    current_reward: f32,
    current_length: usize,
    episode_rewards: Vec<f32>,
    episode_lengths: Vec<usize>,
}

impl<E: Environment> Monitor<E> {
    pub const COUNTER: &'static str = "Monitor";

    pub fn new(env: E) -> Self {
        Self::with_history(env, DEFAULT_EPISODE_HISTORY)
    }

    pub fn with_history(env: E, history: usize) -> Self {
        Monitor {
            env,
            history: history.max(1),
            total_steps: 0,
            current_reward: 0.0,
            current_length: 0,
            episode_rewards: Vec::new(),
            episode_lengths: Vec::new(),
        }
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn episode_lengths(&self) -> &[usize] {
        &self.episode_lengths
    }
}

impl<E: Environment> Environment for Monitor<E> {
    fn reset(&mut self) -> Result<Frame> {
        // A reset mid-episode discards the partial episode.
        self.current_reward = 0.0;
        self.current_length = 0;
        self.env.reset()
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        let mut step = self.env.step(action)?;
        self.total_steps += 1;
        self.current_reward += step.reward;
        self.current_length += 1;
        if step.done {
            step.info.insert("episode_reward".to_string(), f64::from(self.current_reward));
            step.info.insert("episode_length".to_string(), self.current_length as f64);
            self.episode_rewards.push(self.current_reward);
            self.episode_lengths.push(self.current_length);
            if self.episode_rewards.len() > self.history {
                let excess = self.episode_rewards.len() - self.history;
                self.episode_rewards.drain(..excess);
                self.episode_lengths.drain(..excess);
            }
            self.current_reward = 0.0;
            self.current_length = 0;
        }
        Ok(step)
    }

    fn num_actions(&self) -> usize {
        self.env.num_actions()
    }

    fn step_counter(&self, name: &str) -> Option<usize> {
        if name == Self::COUNTER {
            Some(self.total_steps)
        } else {
            self.env.step_counter(name)
        }
    }

    fn episode_rewards(&self) -> Option<&[f32]> {
        Some(&self.episode_rewards)
    }
}

/// Repeats each action `skip` times, returning the summed reward and the
/// pixel-wise maximum of the last two frames.
#[derive(Clone, Debug)]
pub struct MaxAndSkip<E> {
    env: E,
    skip: usize,
}

impl<E: Environment> MaxAndSkip<E> {
    pub fn new(env: E, skip: usize) -> Result<Self> {
        if skip == 0 {
            return Err(DqnError::configuration("skip", "must be greater than 0"));
        }
        Ok(MaxAndSkip { env, skip })
    }
}

impl<E: Environment> Environment for MaxAndSkip<E> {
    fn reset(&mut self) -> Result<Frame> {
        self.env.reset()
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        let mut total_reward = 0.0;
        let mut previous: Option<Frame> = None;
        let mut last = self.env.step(action)?;
        total_reward += last.reward;

        for _ in 1..self.skip {
            if last.done {
                break;
            }
            let next = self.env.step(action)?;
            total_reward += next.reward;
            previous = Some(std::mem::replace(&mut last, next).frame);
        }

        if let Some(prev) = previous {
            if prev.dim() == last.frame.dim() {
                Zip::from(&mut last.frame).and(&prev).for_each(|a, &b| *a = (*a).max(b));
            }
        }
        last.reward = total_reward;
        Ok(last)
    }

    fn num_actions(&self) -> usize {
        self.env.num_actions()
    }

    fn step_counter(&self, name: &str) -> Option<usize> {
        self.env.step_counter(name)
    }

    fn episode_rewards(&self) -> Option<&[f32]> {
        self.env.episode_rewards()
    }
}

/// Replaces every reward by its sign; zero stays zero.
#[derive(Clone, Debug)]
pub struct ClipReward<E> {
    env: E,
}

impl<E: Environment> ClipReward<E> {
    pub fn new(env: E) -> Self {
        ClipReward { env }
    }
}

impl<E: Environment> Environment for ClipReward<E> {
    fn reset(&mut self) -> Result<Frame> {
        self.env.reset()
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        let mut step = self.env.step(action)?;
        step.reward = if step.reward > 0.0 {
            1.0
        } else if step.reward < 0.0 {
            -1.0
        } else {
            0.0
        };
        Ok(step)
    }

    fn num_actions(&self) -> usize {
        self.env.num_actions()
    }

    fn step_counter(&self, name: &str) -> Option<usize> {
        self.env.step_counter(name)
    }

    fn episode_rewards(&self) -> Option<&[f32]> {
        self.env.episode_rewards()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    /// Emits frames filled with the step index and scripted rewards.
    struct Scripted {
        rewards: Vec<f32>,
        t: usize,
    }

    impl Environment for Scripted {
        fn reset(&mut self) -> Result<Frame> {
            self.t = 0;
            Ok(Array3::zeros((2, 2, 1)))
        }

        fn step(&mut self, _action: usize) -> Result<Step> {
            let reward = self.rewards[self.t];
            self.t += 1;
            let mut frame = Array3::from_elem((2, 2, 1), self.t as u8);
            if self.t == 2 {
                // Older frame brighter in one pixel to exercise the max.
                frame[[0, 0, 0]] = 0;
            }
            Ok(Step::new(frame, reward, self.t == self.rewards.len()))
        }

        fn num_actions(&self) -> usize {
            2
        }
    }

    fn scripted(rewards: Vec<f32>) -> Scripted {
        Scripted { rewards, t: 0 }
    }

    #[test]
    fn test_max_and_skip_sums_rewards_and_maxes_frames() {
        let mut env = MaxAndSkip::new(scripted(vec![1.0, 2.0, 3.0, 4.0, 5.0]), 3).unwrap();
        env.reset().unwrap();
        let step = env.step(0).unwrap();
        assert_eq!(step.reward, 6.0);
        assert!(!step.done);
        assert!(step.frame.iter().all(|&p| p == 3));

        // Stops early on episode end.
        let step = env.step(0).unwrap();
        assert_eq!(step.reward, 9.0);
        assert!(step.done);
    }

    #[test]
    fn test_monitor_counts_raw_steps_through_wrappers() {
        let monitor = Monitor::new(scripted(vec![0.5, -2.0, 4.0]));
        let mut env = ClipReward::new(MaxAndSkip::new(monitor, 2).unwrap());
        env.reset().unwrap();

        let first = env.step(1).unwrap();
        assert_eq!(first.reward, -1.0);
        let last = env.step(1).unwrap();
        assert_eq!(last.reward, 1.0);
        assert!(last.done);
        assert_eq!(last.info.get("episode_reward"), Some(&2.5));

        assert_eq!(env.step_counter(Monitor::<Scripted>::COUNTER), Some(3));
        assert_eq!(env.step_counter("other"), None);
        assert_eq!(env.episode_rewards(), Some(&[2.5f32][..]));
    }

    #[test]
    fn test_monitor_keeps_recent_episodes() {
        let mut env = Monitor::with_history(scripted(vec![1.0, 2.0]), 2);
        for _ in 0..3 {
            env.reset().unwrap();
            env.step(0).unwrap();
            assert!(env.step(0).unwrap().done);
        }
        assert_eq!(env.total_steps(), 6);
        assert_eq!(env.episode_rewards(), Some(&[3.0f32, 3.0][..]));
        assert_eq!(env.episode_lengths(), &[2, 2]);
    }

    #[test]
    fn test_clip_reward_keeps_zero() {
        let mut env = ClipReward::new(scripted(vec![0.0, 0.25]));
        env.reset().unwrap();
        assert_eq!(env.step(0).unwrap().reward, 0.0);
        assert_eq!(env.step(0).unwrap().reward, 1.0);
    }
}
