//! Hyperparameters of the classic Atari DQN run, derived from a timestep
//! budget.

use crate::approximator::ModelKind;
use crate::config::LearnConfig;
use crate::env::Environment;
use crate::error::Result;
use crate::optimizer::OptimizerSpec;
use crate::schedule::Schedule;

const ADAM_EPSILON: f32 = 1e-4;
const EXPLORATION_ANNEAL_STEPS: i64 = 1_000_000;

/// Optimizer iterations implied by `timesteps` at one update every four steps.
fn num_iterations(timesteps: u64) -> i64 {
    (timesteps / 4) as i64
}

/// Learning rate: hold `1e-4 * multiplier` for the first tenth of the run,
/// then decay to `5e-5 * multiplier` by the halfway point.
///
/// Breakpoints are nudged apart for very small budgets so they stay strictly
/// increasing.
pub fn learning_rate_schedule(timesteps: u64, multiplier: f64) -> Result<Schedule> {
    let n = num_iterations(timesteps);
    let hold = (n / 10).max(1);
    let decayed = (n / 2).max(hold + 1);
    Schedule::piecewise(
        vec![
            (0, 1e-4 * multiplier),
            (hold, 1e-4 * multiplier),
            (decayed, 5e-5 * multiplier),
        ],
        5e-5 * multiplier,
    )
}

/// Epsilon: 1.0 down to 0.1 over the first million steps, then down to 0.01
/// by the halfway point of the run.
pub fn exploration_schedule(timesteps: u64) -> Result<Schedule> {
    let half = num_iterations(timesteps) / 2;
    let last = if half > EXPLORATION_ANNEAL_STEPS { half } else { 1_000_000_000 };
    Schedule::piecewise(
        vec![(0, 1.0), (EXPLORATION_ANNEAL_STEPS, 0.1), (last, 0.01)],
        0.01,
    )
}

/// Adam for the networks with trainable convolutions, SGD for the linear model.
pub fn optimizer_spec(model: ModelKind, timesteps: u64, lr_multiplier: f64) -> Result<OptimizerSpec> {
    let lr_schedule = learning_rate_schedule(timesteps, lr_multiplier)?;
    Ok(match model {
        ModelKind::FeatureLinear => OptimizerSpec::sgd(lr_schedule),
        ModelKind::Atari | ModelKind::Simple { .. } => OptimizerSpec::adam(ADAM_EPSILON, lr_schedule),
    })
}

/// Training loop settings of the Atari run.
pub fn atari_config() -> LearnConfig {
    LearnConfig::default()
        .replay_capacity(1_000_000)
        .batch_size(32)
        .gamma(0.99)
        .learning_starts(50_000)
        .learning_freq(4)
        .frame_history_len(4)
        .target_update_freq(10_000)
        .grad_norm_clip(10.0)
}

/// Stop once the environment has taken `timesteps` raw steps, read from the
/// named counter when available.
pub fn stop_after<E: Environment + ?Sized>(
    timesteps: usize,
    counter: &'static str,
) -> impl FnMut(&E, usize) -> bool {
    move |env: &E, step: usize| env.step_counter(counter).unwrap_or(step) >= timesteps
}
