use ndarray::{Array3, Axis};
use rand::{rngs::StdRng, SeedableRng};

use crate::error::DqnError;
use crate::replay_buffer::{Frame, ReplayBuffer};

fn frame(value: u8) -> Frame {
    Array3::from_elem((2, 2, 1), value)
}

/// Store frames `1..=n`, marking the listed frame values as episode ends.
fn filled(capacity: usize, history: usize, n: u8, dones: &[u8]) -> ReplayBuffer {
    let mut buffer = ReplayBuffer::new(capacity, history).unwrap();
    for v in 1..=n {
        let idx = buffer.store_frame(frame(v).view()).unwrap();
        buffer.store_effect(idx, v as usize % 3, v as f32, dones.contains(&v)).unwrap();
    }
    buffer
}

/// First-pixel value of each stacked frame.
fn stack_values(obs: ndarray::ArrayView3<u8>) -> Vec<u8> {
    obs.index_axis(Axis(0), 0).index_axis(Axis(0), 0).to_vec()
}

#[test]
fn test_ring_below_capacity() {
    let buffer = filled(10, 4, 7, &[]);
    assert_eq!(buffer.len(), 7);
    assert_eq!(buffer.next_idx(), 7);
    assert_eq!(buffer.observation_shape(), Some((2, 2, 4)));
}

#[test]
fn test_ring_overwrites_oldest() {
    let buffer = filled(5, 2, 12, &[]);
    assert_eq!(buffer.len(), 5);
    assert_eq!(buffer.next_idx(), 12 % 5);

    // Only frames 8..=12 remain; the oldest sampled observation is [0, 8].
    let mut rng = StdRng::seed_from_u64(1);
    let batch = buffer.sample(4, &mut rng).unwrap();
    for (i, &pos) in batch.positions.iter().enumerate() {
        let values = stack_values(batch.obs.index_axis(Axis(0), i));
        let newest = 8 + pos as u8;
        assert_eq!(*values.last().unwrap(), newest);
        assert!(values.iter().all(|&v| v == 0 || v >= 8));
        assert_eq!(batch.rewards[i], newest as f32);
    }
}

#[test]
fn test_episode_boundary_padding() {
    // Episode ends after frame 3; frames 4 and 5 start a new episode.
    let buffer = filled(10, 4, 6, &[3]);
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..50 {
        let batch = buffer.sample(2, &mut rng).unwrap();
        for (i, &pos) in batch.positions.iter().enumerate() {
            let obs = stack_values(batch.obs.index_axis(Axis(0), i));
            let next = stack_values(batch.next_obs.index_axis(Axis(0), i));
            match pos {
                0 => assert_eq!(obs, vec![0, 0, 0, 1]),
                2 => {
                    assert_eq!(obs, vec![0, 1, 2, 3]);
                    assert_eq!(batch.done_mask[i], 1.0);
                    // The next window belongs to the new episode only.
                    assert_eq!(next, vec![0, 0, 0, 4]);
                }
                4 => {
                    assert_eq!(obs, vec![0, 0, 4, 5]);
                    assert_eq!(next, vec![0, 4, 5, 6]);
                    assert_eq!(batch.done_mask[i], 0.0);
                }
                _ => {}
            }
            assert!(pos < buffer.len() - 1);
        }
    }
}

#[test]
fn test_sample_requires_enough_frames() {
    let buffer = filled(10, 2, 3, &[]);
    assert!(buffer.can_sample(2));
    assert!(!buffer.can_sample(3));
    assert!(!buffer.can_sample(0));
    let mut rng = StdRng::seed_from_u64(0);
    assert!(matches!(
        buffer.sample(3, &mut rng),
        Err(DqnError::PreconditionViolation(_))
    ));
}

#[test]
fn test_recent_observation_after_episode_end() {
    let mut buffer = filled(10, 3, 4, &[4]);
    let idx = buffer.store_frame(frame(9).view()).unwrap();
    assert_eq!(stack_values(buffer.encode_recent_observation().unwrap().view()), vec![0, 0, 9]);
    buffer.store_effect(idx, 0, 0.0, false).unwrap();
}

#[test]
fn test_actions_round_trip_through_sampling() {
    let buffer = filled(20, 1, 15, &[]);
    let mut rng = StdRng::seed_from_u64(11);
    let batch = buffer.sample(8, &mut rng).unwrap();
    for (i, &pos) in batch.positions.iter().enumerate() {
        let value = pos + 1;
        assert_eq!(batch.actions[i], value % 3);
    }
}
