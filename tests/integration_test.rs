use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use ndarray::{Array2, ArrayView2, ArrayView4};
use rand::rngs::StdRng;

use pixel_dqn::{
    approximator::{ApproximatorFactory, FunctionApproximator, ModelKind, ObservationShape, QNetwork},
    checkpoint::{checkpoint_path, inspect_parameter, BincodeCheckpointStore, CheckpointStore},
    config::LearnConfig,
    env::{Catch, ClipReward, Environment, MaxAndSkip, Monitor},
    learn, learn_with_store,
    optimizer::OptimizerSpec,
    parameters::ParameterSet,
    presets,
    schedule::Schedule,
    DqnError, Result,
};

fn catch_env(seed: u64) -> ClipReward<Monitor<Catch>> {
    ClipReward::new(Monitor::new(Catch::new(8, 2, seed).unwrap()))
}

fn small_config(dir: &Path) -> LearnConfig {
    LearnConfig::default()
        .replay_capacity(500)
        .batch_size(8)
        .learning_starts(50)
        .learning_freq(2)
        .frame_history_len(2)
        .target_update_freq(20)
        .checkpoint_interval(100)
        .log_interval(100)
        .seed(5)
        .checkpoint_dir(dir)
}

fn exploration() -> Schedule {
    Schedule::piecewise(vec![(0, 1.0), (200, 0.1)], 0.1).unwrap()
}

fn optimizer() -> OptimizerSpec {
    OptimizerSpec::adam(1e-4, Schedule::constant(1e-3))
}

#[test]
fn test_end_to_end_training_on_catch() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path()).metrics_path(Some(dir.path().join("metrics.json")));
    let mut env = catch_env(1);

    let path = learn(
        &mut env,
        &ModelKind::Simple { num_filters: 4 },
        optimizer(),
        &exploration(),
        |_, step| step >= 300,
        &config,
    )
    .unwrap();

    assert_eq!(path, checkpoint_path(dir.path(), 300));
    assert!(checkpoint_path(dir.path(), 100).exists());
    assert!(dir.path().join("metrics.json").exists());
    // 300 steps of a 7-step game finish dozens of episodes.
    assert!(env.episode_rewards().unwrap().len() >= 40);

    let norms = inspect_parameter(&BincodeCheckpointStore, &path, "action_value/fully_connected/weights").unwrap();
    assert_eq!(norms.shape[1], 3);
    assert!(norms.frobenius > 0.0);
}

#[test]
fn test_same_seed_same_checkpoint() {
    let run = |dir: &Path| {
        let mut env = catch_env(3);
        learn(
            &mut env,
            &ModelKind::FeatureLinear,
            OptimizerSpec::sgd(Schedule::constant(1e-2)),
            &exploration(),
            |_, step| step >= 120,
            &small_config(dir),
        )
        .unwrap()
    };
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let pa = BincodeCheckpointStore.load(&run(a.path())).unwrap();
    let pb = BincodeCheckpointStore.load(&run(b.path())).unwrap();
    assert_eq!(pa, pb);
}

#[test]
fn test_restore_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let mut env = catch_env(2);
    let model = ModelKind::Simple { num_filters: 2 };
    let first = learn(&mut env, &model, optimizer(), &exploration(), |_, s| s >= 100, &small_config(dir.path()))
        .unwrap();
    let trained = BincodeCheckpointStore.load(&first).unwrap();

    // Stopping immediately saves the restored parameters unchanged.
    let resumed_dir = tempfile::tempdir().unwrap();
    let config = small_config(resumed_dir.path()).restore_path(Some(first));
    let second = learn(&mut catch_env(2), &model, optimizer(), &exploration(), |_, _| true, &config).unwrap();
    assert_eq!(second, checkpoint_path(resumed_dir.path(), 0));
    assert_eq!(BincodeCheckpointStore.load(&second).unwrap(), trained);
}

#[test]
fn test_failed_restore_aborts() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path()).restore_path(Some(dir.path().join("missing.ckpt")));
    let result = learn(
        &mut catch_env(0),
        &ModelKind::FeatureLinear,
        optimizer(),
        &exploration(),
        |_, _| true,
        &config,
    );
    assert!(matches!(result, Err(DqnError::Persistence(_))));
}

/// Fails the first `failures` saves, then delegates to bincode files.
struct FlakyStore {
    failures: Cell<usize>,
}

impl CheckpointStore for FlakyStore {
    fn save(&self, params: &ParameterSet, path: &Path) -> Result<()> {
        if self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            return Err(DqnError::Persistence(format!("disk full writing {}", path.display())));
        }
        BincodeCheckpointStore.save(params, path)
    }

    fn load(&self, path: &Path) -> Result<ParameterSet> {
        BincodeCheckpointStore.load(path)
    }
}

#[test]
fn test_checkpoint_failure_is_logged_and_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let store = FlakyStore { failures: Cell::new(1) };
    let path = learn_with_store(
        &mut catch_env(4),
        &ModelKind::FeatureLinear,
        optimizer(),
        &exploration(),
        |_, step| step >= 250,
        &small_config(dir.path()),
        &store,
    )
    .unwrap();
    assert!(!checkpoint_path(dir.path(), 100).exists());
    assert!(checkpoint_path(dir.path(), 200).exists());
    assert_eq!(path, checkpoint_path(dir.path(), 250));
}

#[test]
fn test_fatal_checkpoint_errors() {
    let dir = tempfile::tempdir().unwrap();
    let store = FlakyStore { failures: Cell::new(1) };
    let config = small_config(dir.path()).fatal_checkpoint_errors(true);
    let result = learn_with_store(
        &mut catch_env(4),
        &ModelKind::FeatureLinear,
        optimizer(),
        &exploration(),
        |_, step| step >= 250,
        &config,
        &store,
    );
    assert!(matches!(result, Err(DqnError::Persistence(_))));
}

#[test]
fn test_no_checkpoint_written_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = FlakyStore { failures: Cell::new(usize::MAX) };
    let result = learn_with_store(
        &mut catch_env(4),
        &ModelKind::FeatureLinear,
        optimizer(),
        &exploration(),
        |_, step| step >= 30,
        &small_config(dir.path()),
        &store,
    );
    assert!(matches!(result, Err(DqnError::Persistence(_))));
}

#[test]
fn test_stop_on_monitor_counter() {
    let dir = tempfile::tempdir().unwrap();
    let mut env = MaxAndSkip::new(Monitor::new(Catch::new(8, 2, 9).unwrap()), 2).unwrap();
    let path = learn(
        &mut env,
        &ModelKind::FeatureLinear,
        optimizer(),
        &exploration(),
        presets::stop_after(100, Monitor::<Catch>::COUNTER),
        &small_config(dir.path()),
    )
    .unwrap();

    let raw_steps = env.step_counter(Monitor::<Catch>::COUNTER).unwrap();
    assert!(raw_steps >= 100);
    assert!(raw_steps < 110);
    // Each wrapped step advances the raw counter by one or two.
    let file = path.file_name().unwrap().to_string_lossy().into_owned();
    let wrapped_steps: usize = file
        .trim_start_matches("model-")
        .trim_end_matches(".ckpt")
        .parse()
        .unwrap();
    assert!(wrapped_steps < raw_steps);
}

#[test]
fn test_invalid_config_rejected_before_training() {
    let dir = tempfile::tempdir().unwrap();
    let config = small_config(dir.path()).batch_size(0);
    let result = learn(
        &mut catch_env(0),
        &ModelKind::FeatureLinear,
        optimizer(),
        &exploration(),
        |_, _| false,
        &config,
    );
    assert!(matches!(result, Err(DqnError::Configuration { .. })));
}

/// Counts the gradient computations of every network it builds.
struct CountingFactory {
    model: ModelKind,
    backward_calls: Rc<Cell<usize>>,
}

struct CountingNet {
    net: QNetwork,
    backward_calls: Rc<Cell<usize>>,
}

impl FunctionApproximator for CountingNet {
    fn num_actions(&self) -> usize {
        self.net.num_actions()
    }

    fn observation_shape(&self) -> ObservationShape {
        self.net.observation_shape()
    }

    fn forward(&mut self, observations: ArrayView4<f32>) -> Result<Array2<f32>> {
        self.net.forward(observations)
    }

    fn backward(&mut self, output_gradient: ArrayView2<f32>) -> Result<ParameterSet> {
        self.backward_calls.set(self.backward_calls.get() + 1);
        self.net.backward(output_gradient)
    }

    fn parameters(&self) -> &ParameterSet {
        self.net.parameters()
    }

    fn parameters_mut(&mut self) -> &mut ParameterSet {
        self.net.parameters_mut()
    }
}

impl ApproximatorFactory for CountingFactory {
    type Output = CountingNet;

    fn build(&self, observation_shape: ObservationShape, num_actions: usize, rng: &mut StdRng) -> Result<CountingNet> {
        Ok(CountingNet {
            net: self.model.build(observation_shape, num_actions, rng)?,
            backward_calls: Rc::clone(&self.backward_calls),
        })
    }
}

fn count_updates(steps: usize) -> usize {
    let dir = tempfile::tempdir().unwrap();
    let factory = CountingFactory {
        model: ModelKind::FeatureLinear,
        backward_calls: Rc::new(Cell::new(0)),
    };
    let config = small_config(dir.path()).learning_starts(48).learning_freq(4);
    learn(
        &mut catch_env(6),
        &factory,
        OptimizerSpec::sgd(Schedule::constant(1e-2)),
        &exploration(),
        |_, step| step >= steps,
        &config,
    )
    .unwrap();
    factory.backward_calls.get()
}

#[test]
fn test_no_updates_during_warmup() {
    assert_eq!(count_updates(48), 0);
}

#[test]
fn test_updates_every_learning_freq_steps_after_warmup() {
    // t = 48, 52, ..., 96
    assert_eq!(count_updates(100), 13);
    assert_eq!(count_updates(49), 1);
}
