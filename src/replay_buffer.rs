//! # Frame Replay Buffer
//!
//! A fixed-capacity ring of single frames plus the action, reward and done
//! flag observed after each one. Stacked observations of `frame_history_len`
//! frames are synthesized on demand, so every pixel is stored exactly once.
//!
//! Usage follows a strict pairing: every [`ReplayBuffer::store_frame`] is
//! followed by exactly one [`ReplayBuffer::store_effect`] for the returned
//! slot before the next frame is stored.
//!
//! ```rust
//! use pixel_dqn::replay_buffer::ReplayBuffer;
//! use ndarray::Array3;
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! let mut buffer = ReplayBuffer::new(100, 4).unwrap();
//! let mut rng = StdRng::seed_from_u64(0);
//! for step in 0..10u8 {
//!     let frame = Array3::from_elem((2, 2, 1), step);
//!     let idx = buffer.store_frame(frame.view()).unwrap();
//!     let obs = buffer.encode_recent_observation().unwrap();
//!     assert_eq!(obs.dim(), (2, 2, 4));
//!     buffer.store_effect(idx, 0, 1.0, false).unwrap();
//! }
//! assert!(buffer.can_sample(4));
//! let batch = buffer.sample(4, &mut rng).unwrap();
//! assert_eq!(batch.obs.dim(), (4, 2, 2, 4));
//! ```

use ndarray::{s, Array1, Array3, Array4, ArrayView3, Axis};
use rand::Rng;

use crate::error::{DqnError, Result};

/// One raw observation: `(height, width, channels)` pixels.
pub type Frame = Array3<u8>;

/// A sampled mini-batch of stacked transitions.
#[derive(Clone, Debug)]
pub struct Batch {
    /// `(batch, height, width, channels * history)`
    pub obs: Array4<u8>,
    pub actions: Vec<usize>,
    pub rewards: Array1<f32>,
    /// Same layout as `obs`, window ending one frame later
    pub next_obs: Array4<u8>,
    /// 1.0 where the transition ended its episode, else 0.0
    pub done_mask: Array1<f32>,
    /// Sampled positions, counted from the oldest resident frame
    pub positions: Vec<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct ReplayBuffer {
    capacity: usize,
    frame_history_len: usize,
    /// `(capacity, height, width, channels)`, allocated on the first frame
    frames: Option<Array4<u8>>,
    actions: Vec<usize>,
    rewards: Vec<f32>,
    done: Vec<bool>,
    next_idx: usize,
    num_in_buffer: usize,
    pending_effect: Option<usize>,
}

impl ReplayBuffer {
    pub fn new(capacity: usize, frame_history_len: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(DqnError::configuration("capacity", "must be greater than 0"));
        }
        if frame_history_len == 0 {
            return Err(DqnError::configuration(
                "frame_history_len",
                "must be greater than 0",
            ));
        }

        Ok(ReplayBuffer {
            capacity,
            frame_history_len,
            frames: None,
            actions: vec![0; capacity],
            rewards: vec![0.0; capacity],
            done: vec![false; capacity],
            next_idx: 0,
            num_in_buffer: 0,
            pending_effect: None,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn frame_history_len(&self) -> usize {
        self.frame_history_len
    }

    /// Number of valid slots, at most `capacity`.
    pub fn len(&self) -> usize {
        self.num_in_buffer
    }

    pub fn is_empty(&self) -> bool {
        self.num_in_buffer == 0
    }

    /// Ring-write cursor.
    pub fn next_idx(&self) -> usize {
        self.next_idx
    }

    /// Shape of a single stored frame, once the first frame has arrived.
    pub fn frame_shape(&self) -> Option<(usize, usize, usize)> {
        self.frames.as_ref().map(|f| {
            let (_, h, w, c) = f.dim();
            (h, w, c)
        })
    }

    /// Shape of a stacked observation, once the first frame has arrived.
    pub fn observation_shape(&self) -> Option<(usize, usize, usize)> {
        self.frame_shape()
            .map(|(h, w, c)| (h, w, c * self.frame_history_len))
    }

    pub fn can_sample(&self, batch_size: usize) -> bool {
        batch_size > 0 && self.num_in_buffer > batch_size
    }

    /// Insert one frame at the cursor and return its slot.
    pub fn store_frame(&mut self, frame: ArrayView3<u8>) -> Result<usize> {
        if let Some(idx) = self.pending_effect {
            return Err(DqnError::precondition(format!(
                "store_frame called while the effect for slot {} is still pending",
                idx
            )));
        }

        let capacity = self.capacity;
        let frames = self.frames.get_or_insert_with(|| {
            let (h, w, c) = frame.dim();
            Array4::zeros((capacity, h, w, c))
        });

        let (_, h, w, c) = frames.dim();
        if frame.dim() != (h, w, c) {
            return Err(DqnError::dimension_mismatch(
                format!("{:?}", (h, w, c)),
                format!("{:?}", frame.dim()),
            ));
        }

        let idx = self.next_idx;
        frames.index_axis_mut(Axis(0), idx).assign(&frame);
        self.next_idx = (self.next_idx + 1) % self.capacity;
        self.num_in_buffer = (self.num_in_buffer + 1).min(self.capacity);
        self.pending_effect = Some(idx);
        Ok(idx)
    }

    /// Record what happened after the frame stored at `idx`.
    pub fn store_effect(&mut self, idx: usize, action: usize, reward: f32, done: bool) -> Result<()> {
        if idx >= self.capacity {
            return Err(DqnError::precondition(format!(
                "slot {} out of range for capacity {}",
                idx, self.capacity
            )));
        }
        match self.pending_effect {
            Some(pending) if pending == idx => {}
            Some(pending) => {
                return Err(DqnError::precondition(format!(
                    "store_effect for slot {} but slot {} is pending",
                    idx, pending
                )))
            }
            None => {
                return Err(DqnError::precondition(format!(
                    "store_effect for slot {} without a matching store_frame",
                    idx
                )))
            }
        }

        self.actions[idx] = action;
        self.rewards[idx] = reward;
        self.done[idx] = done;
        self.pending_effect = None;
        Ok(())
    }

    /// Stack the most recent frames into the observation used to act.
    pub fn encode_recent_observation(&self) -> Result<Array3<u8>> {
        if self.num_in_buffer == 0 {
            return Err(DqnError::precondition(
                "encode_recent_observation called on an empty buffer",
            ));
        }
        Ok(self.encode_window(self.num_in_buffer - 1))
    }

    /// Draw `batch_size` transitions uniformly, with replacement.
    pub fn sample<R: Rng + ?Sized>(&self, batch_size: usize, rng: &mut R) -> Result<Batch> {
        if !self.can_sample(batch_size) {
            return Err(DqnError::precondition(format!(
                "cannot sample {} transitions from a buffer holding {}",
                batch_size, self.num_in_buffer
            )));
        }
        let (h, w, c) = self
            .observation_shape()
            .ok_or_else(|| DqnError::precondition("no frames stored"))?;

        // The newest frame has no successor yet, so positions stop one short.
        let positions: Vec<usize> = (0..batch_size)
            .map(|_| rng.gen_range(0..self.num_in_buffer - 1))
            .collect();

        let mut obs = Array4::zeros((batch_size, h, w, c));
        let mut next_obs = Array4::zeros((batch_size, h, w, c));
        let mut actions = Vec::with_capacity(batch_size);
        let mut rewards = Array1::zeros(batch_size);
        let mut done_mask = Array1::zeros(batch_size);

        for (i, &pos) in positions.iter().enumerate() {
            let slot = self.slot(pos);
            obs.index_axis_mut(Axis(0), i).assign(&self.encode_window(pos));
            next_obs.index_axis_mut(Axis(0), i).assign(&self.encode_window(pos + 1));
            actions.push(self.actions[slot]);
            rewards[i] = self.rewards[slot];
            done_mask[i] = if self.done[slot] { 1.0 } else { 0.0 };
        }

        Ok(Batch {
            obs,
            actions,
            rewards,
            next_obs,
            done_mask,
            positions,
        })
    }

    /// Physical slot of the frame `position` steps after the oldest one.
    fn slot(&self, position: usize) -> usize {
        let oldest = (self.next_idx + self.capacity - self.num_in_buffer) % self.capacity;
        (oldest + position) % self.capacity
    }

    /// Stack the `frame_history_len` frames ending at `end` (a position).
    ///
    /// Positions before the oldest resident frame, and frames belonging to an
    /// episode that ended inside the window, are replaced with zeros.
    fn encode_window(&self, end: usize) -> Array3<u8> {
        let frames = match self.frames.as_ref() {
            Some(frames) => frames,
            None => return Array3::zeros((0, 0, 0)),
        };
        let (_, h, w, c) = frames.dim();
        let k = self.frame_history_len;

        let mut start = (end + 1).saturating_sub(k);
        for pos in start..end {
            if self.done[self.slot(pos)] {
                start = pos + 1;
            }
        }

        let present = end + 1 - start;
        let missing = k - present;
        let mut stacked = Array3::zeros((h, w, c * k));
        for (i, pos) in (start..=end).enumerate() {
            let channel = (missing + i) * c;
            stacked
                .slice_mut(s![.., .., channel..channel + c])
                .assign(&frames.index_axis(Axis(0), self.slot(pos)));
        }
        stacked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn frame(value: u8) -> Frame {
        Array3::from_elem((1, 1, 1), value)
    }

    #[test]
    fn test_rejects_zero_capacity() {
        assert!(ReplayBuffer::new(0, 4).is_err());
        assert!(ReplayBuffer::new(4, 0).is_err());
    }

    #[test]
    fn test_pairing_enforced() {
        let mut buffer = ReplayBuffer::new(4, 2).unwrap();
        let idx = buffer.store_frame(frame(1).view()).unwrap();
        assert!(matches!(
            buffer.store_frame(frame(2).view()),
            Err(DqnError::PreconditionViolation(_))
        ));
        assert!(buffer.store_effect(idx + 1, 0, 0.0, false).is_err());
        assert!(buffer.store_effect(99, 0, 0.0, false).is_err());
        buffer.store_effect(idx, 0, 0.0, false).unwrap();
        assert!(buffer.store_effect(idx, 0, 0.0, false).is_err());
    }

    #[test]
    fn test_frame_shape_mismatch() {
        let mut buffer = ReplayBuffer::new(4, 2).unwrap();
        let idx = buffer.store_frame(frame(1).view()).unwrap();
        buffer.store_effect(idx, 0, 0.0, false).unwrap();
        let wrong = Array3::<u8>::zeros((2, 1, 1));
        assert!(matches!(
            buffer.store_frame(wrong.view()),
            Err(DqnError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_recent_observation_pads_short_history() {
        let mut buffer = ReplayBuffer::new(8, 4).unwrap();
        assert!(buffer.encode_recent_observation().is_err());
        buffer.store_frame(frame(7).view()).unwrap();
        let obs = buffer.encode_recent_observation().unwrap();
        assert_eq!(obs.iter().copied().collect::<Vec<_>>(), vec![0, 0, 0, 7]);
    }

    #[test]
    fn test_window_never_reaches_past_oldest_frame() {
        let mut buffer = ReplayBuffer::new(3, 3).unwrap();
        for v in 1..=5u8 {
            let idx = buffer.store_frame(frame(v).view()).unwrap();
            buffer.store_effect(idx, 0, 0.0, false).unwrap();
        }
        // Resident frames: 3, 4, 5. The window at the oldest must not wrap to 5.
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let batch = buffer.sample(1, &mut rng).unwrap();
            let obs: Vec<u8> = batch.obs.iter().copied().collect();
            match batch.positions[0] {
                0 => assert_eq!(obs, vec![0, 0, 3]),
                1 => assert_eq!(obs, vec![0, 3, 4]),
                p => panic!("unexpected position {}", p),
            }
        }
    }
}
