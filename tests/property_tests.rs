#[cfg(test)]
mod property_tests {
    use ndarray::{Array3, ArrayView3, Axis};
    use pixel_dqn::replay_buffer::ReplayBuffer;
    use pixel_dqn::schedule::Schedule;
    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    /// Fill a buffer with single-pixel frames valued `1..=n`.
    fn fill(capacity: usize, history: usize, dones: &[bool]) -> ReplayBuffer {
        let mut buffer = ReplayBuffer::new(capacity, history).unwrap();
        for (i, &done) in dones.iter().enumerate() {
            let frame = Array3::from_elem((1, 1, 1), (i + 1) as u8);
            let idx = buffer.store_frame(frame.view()).unwrap();
            buffer.store_effect(idx, 0, 0.0, done).unwrap();
        }
        buffer
    }

    fn stacked(obs: ArrayView3<u8>) -> Vec<u8> {
        obs.iter().copied().collect()
    }

    /// Window ending at frame value `end`, built from first principles.
    fn expected_window(end: usize, history: usize, first_resident: usize, dones: &[bool]) -> Vec<u8> {
        let mut window = vec![0u8; history];
        for j in 0..history {
            if j > end - first_resident {
                break;
            }
            let v = end - j;
            // Frame v belongs to an earlier episode if it or any frame after
            // it (before `end`) ended an episode.
            if j > 0 && (v..end).any(|u| dones[u - 1]) {
                break;
            }
            window[history - 1 - j] = v as u8;
        }
        window
    }

    fn dones_strategy() -> impl Strategy<Value = Vec<bool>> {
        prop::collection::vec(prop::bool::weighted(0.2), 2..=60)
    }

    proptest! {
        #[test]
        fn test_ring_size_and_cursor(capacity in 1usize..20, n in 1usize..60) {
            let buffer = fill(capacity, 1, &vec![false; n]);
            prop_assert_eq!(buffer.len(), n.min(capacity));
            prop_assert_eq!(buffer.next_idx(), n % capacity);
        }

        #[test]
        fn test_sampled_windows_match_reference(
            capacity in 3usize..25,
            history in 1usize..6,
            dones in dones_strategy(),
            seed in any::<u64>(),
        ) {
            let n = dones.len();
            let buffer = fill(capacity, history, &dones);
            let batch_size = 1usize.max(buffer.len() / 2).min(buffer.len() - 1);
            prop_assume!(buffer.can_sample(batch_size));

            let first_resident = n - buffer.len() + 1;
            let mut rng = StdRng::seed_from_u64(seed);
            let batch = buffer.sample(batch_size, &mut rng).unwrap();

            for (i, &pos) in batch.positions.iter().enumerate() {
                prop_assert!(pos < buffer.len() - 1);
                let end = first_resident + pos;
                prop_assert_eq!(
                    stacked(batch.obs.index_axis(Axis(0), i)),
                    expected_window(end, history, first_resident, &dones)
                );
                prop_assert_eq!(
                    stacked(batch.next_obs.index_axis(Axis(0), i)),
                    expected_window(end + 1, history, first_resident, &dones)
                );
                prop_assert_eq!(batch.done_mask[i] == 1.0, dones[end - 1]);
            }
        }

        #[test]
        fn test_piecewise_stays_between_endpoints(step in 0i64..=100) {
            let schedule = Schedule::piecewise(vec![(0, 1.0), (100, 0.1)], 0.01).unwrap();
            let v = schedule.value_at(step);
            prop_assert!((0.1..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_end_to_end_sampling_scenario() {
        // Capacity 10, history 4, 12 frames, episodes end at frames 3 and 9.
        let dones: Vec<bool> = (1..=12).map(|v| v == 3 || v == 9).collect();
        let buffer = fill(10, 4, &dones);
        assert_eq!(buffer.len(), 10);

        let first_resident = 3;
        let mut rng = StdRng::seed_from_u64(2024);
        for _ in 0..100 {
            let batch = buffer.sample(2, &mut rng).unwrap();
            for (i, &pos) in batch.positions.iter().enumerate() {
                assert!(pos < buffer.len() - 1);
                let end = first_resident + pos;
                let obs = stacked(batch.obs.index_axis(Axis(0), i));
                // No window mixes frames from both sides of an episode end.
                let present: Vec<u8> = obs.iter().copied().filter(|&v| v != 0).collect();
                for pair in present.windows(2) {
                    assert_eq!(pair[1], pair[0] + 1);
                    assert!(!dones[pair[0] as usize - 1]);
                }
                assert_eq!(obs, expected_window(end, 4, first_resident, &dones));
            }
        }
    }
}
