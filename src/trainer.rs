//! # Training loop
//!
//! [`learn`] drives the environment, fills the replay buffer, runs
//! optimization steps on the online network, keeps the target network in sync
//! and writes checkpoints until the stopping predicate fires.
//!
//! All mutable run state lives in a [`TrainingContext`] that is threaded
//! through the loop explicitly.

use std::path::PathBuf;

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::agent::DqnLearner;
use crate::approximator::{ApproximatorFactory, FunctionApproximator};
use crate::checkpoint::{checkpoint_path, BincodeCheckpointStore, CheckpointStore};
use crate::config::LearnConfig;
use crate::env::Environment;
use crate::error::{DqnError, Result};
use crate::metrics::tracker::mean_of_last;
use crate::metrics::MetricsTracker;
use crate::optimizer::OptimizerSpec;
use crate::replay_buffer::ReplayBuffer;
use crate::schedule::Schedule;

/// Episodes averaged for the progress log's mean reward
const REWARD_WINDOW: usize = 100;
const METRICS_HISTORY: usize = 10_000;

/// Where the loop is in its lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Acting randomly to fill the replay buffer
    Warmup,
    /// Acting epsilon-greedily and optimizing
    Active,
    Stopped,
}

/// Mutable state of one training run.
#[derive(Debug)]
pub struct TrainingContext {
    pub rng: StdRng,
    /// Environment steps taken by the loop; drives every schedule
    pub env_steps: usize,
    pub opt_steps: usize,
    pub target_syncs: usize,
    pub phase: Phase,
    pub last_checkpoint: Option<PathBuf>,
}

impl TrainingContext {
    pub fn new(seed: u64) -> Self {
        TrainingContext {
            rng: StdRng::seed_from_u64(seed),
            env_steps: 0,
            opt_steps: 0,
            target_syncs: 0,
            phase: Phase::Warmup,
            last_checkpoint: None,
        }
    }

    fn advance_phase(&mut self, learning_starts: usize) {
        if self.phase == Phase::Warmup && self.env_steps >= learning_starts {
            info!("warmup finished after {} steps, learning starts", self.env_steps);
            self.phase = Phase::Active;
        }
    }
}

/// Train a DQN agent on `env` and return the path of the last checkpoint
/// written. Checkpoints are bincode files under `config.checkpoint_dir`.
///
/// `stopping_predicate` is called with the environment and the number of
/// steps taken before every step; training stops as soon as it returns true.
pub fn learn<E, F, P>(
    env: &mut E,
    factory: &F,
    optimizer_spec: OptimizerSpec,
    exploration: &Schedule,
    stopping_predicate: P,
    config: &LearnConfig,
) -> Result<PathBuf>
where
    E: Environment + ?Sized,
    F: ApproximatorFactory,
    P: FnMut(&E, usize) -> bool,
{
    learn_with_store(
        env,
        factory,
        optimizer_spec,
        exploration,
        stopping_predicate,
        config,
        &BincodeCheckpointStore,
    )
}

/// [`learn`] with a caller-supplied checkpoint store.
pub fn learn_with_store<E, F, P, S>(
    env: &mut E,
    factory: &F,
    optimizer_spec: OptimizerSpec,
    exploration: &Schedule,
    mut stopping_predicate: P,
    config: &LearnConfig,
    store: &S,
) -> Result<PathBuf>
where
    E: Environment + ?Sized,
    F: ApproximatorFactory,
    P: FnMut(&E, usize) -> bool,
    S: CheckpointStore + ?Sized,
{
    config.validate()?;
    let num_actions = env.num_actions();
    if num_actions == 0 {
        return Err(DqnError::configuration("num_actions", "environment has no actions"));
    }

    let mut ctx = TrainingContext::new(config.seed);
    let mut buffer = ReplayBuffer::new(config.replay_capacity, config.frame_history_len)?;
    let mut frame = env.reset()?;
    let (h, w, c) = frame.dim();
    let observation_shape = (h, w, c * config.frame_history_len);

    let online = factory.build(observation_shape, num_actions, &mut ctx.rng)?;
    let target = factory.build(observation_shape, num_actions, &mut ctx.rng)?;
    let mut learner = DqnLearner::new(
        online,
        target,
        optimizer_spec,
        config.gamma,
        config.grad_norm_clip,
        config.target_update_freq,
    )?;
    info!(
        "training on {:?} observations, {} actions, {} parameters",
        observation_shape,
        num_actions,
        learner.online().parameters().num_elements()
    );

    if let Some(path) = &config.restore_path {
        let params = store.load(path)?;
        learner.restore(&params)?;
        info!("restored parameters from {}", path.display());
    }

    let mut metrics = MetricsTracker::new(METRICS_HISTORY);
    ctx.advance_phase(config.learning_starts);

    loop {
        if stopping_predicate(&*env, ctx.env_steps) {
            ctx.phase = Phase::Stopped;
            break;
        }
        let t = ctx.env_steps;
        let epsilon = exploration.value_at(t as i64);
        metrics.record_epsilon(epsilon as f32);

        let idx = buffer.store_frame(frame.view())?;
        let action = match ctx.phase {
            Phase::Active => {
                let observation = buffer.encode_recent_observation()?;
                learner.act(observation.view(), epsilon, &mut ctx.rng)?
            }
            _ => ctx.rng.gen_range(0..num_actions),
        };

        let outcome = env.step(action)?;
        buffer.store_effect(idx, action, outcome.reward, outcome.done)?;
        metrics.step(outcome.reward);
        frame = if outcome.done {
            metrics.end_episode();
            env.reset()?
        } else {
            outcome.frame
        };

        if t >= config.learning_starts && t % config.learning_freq == 0 && buffer.can_sample(config.batch_size) {
            let batch = buffer.sample(config.batch_size, &mut ctx.rng)?;
            let stats = learner.optimize(&batch, t as i64)?;
            ctx.opt_steps += 1;
            if stats.synced {
                ctx.target_syncs += 1;
            }
            metrics.record_optimization(&stats);
            debug!("step {} loss {:.5} grad norm {:.4}", t, stats.loss, stats.grad_norm);
        }

        ctx.env_steps += 1;
        ctx.advance_phase(config.learning_starts);

        if ctx.env_steps % config.checkpoint_interval == 0 {
            save_checkpoint(store, &learner, &mut ctx, config)?;
        }
        if ctx.env_steps % config.log_interval == 0 {
            log_progress(&*env, &learner, &mut metrics, &ctx, exploration);
        }
    }

    let final_path = checkpoint_path(&config.checkpoint_dir, ctx.env_steps);
    if ctx.last_checkpoint.as_ref() != Some(&final_path) {
        save_checkpoint(store, &learner, &mut ctx, config)?;
    }
    info!(
        "stopped after {} steps, {} optimization steps, {} target syncs",
        ctx.env_steps, ctx.opt_steps, ctx.target_syncs
    );

    if let Some(path) = &config.metrics_path {
        if let Err(e) = metrics.save(path) {
            warn!("could not export metrics to {}: {}", path.display(), e);
        }
    }

    ctx.last_checkpoint
        .ok_or_else(|| DqnError::Persistence("no checkpoint was written during training".to_string()))
}

fn save_checkpoint<S, Q>(
    store: &S,
    learner: &DqnLearner<Q>,
    ctx: &mut TrainingContext,
    config: &LearnConfig,
) -> Result<()>
where
    S: CheckpointStore + ?Sized,
    Q: FunctionApproximator,
{
    let path = checkpoint_path(&config.checkpoint_dir, ctx.env_steps);
    match store.save(learner.online().parameters(), &path) {
        Ok(()) => {
            info!("saved checkpoint {}", path.display());
            ctx.last_checkpoint = Some(path);
            Ok(())
        }
        Err(e) if e.is_recoverable() && !config.fatal_checkpoint_errors => {
            warn!("skipping checkpoint at step {}: {}", ctx.env_steps, e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn log_progress<E, Q>(
    env: &E,
    learner: &DqnLearner<Q>,
    metrics: &mut MetricsTracker,
    ctx: &TrainingContext,
    exploration: &Schedule,
) where
    E: Environment + ?Sized,
    Q: FunctionApproximator,
{
    let step = ctx.env_steps as i64;
    let mean_reward = match env.episode_rewards() {
        Some(rewards) => mean_of_last(rewards.iter().copied(), rewards.len(), REWARD_WINDOW),
        None => metrics.avg_episode_reward(REWARD_WINDOW),
    };
    let episodes = metrics.episode_count();
    let best = mean_reward.map(|mean| metrics.update_best_mean_reward(mean));

    info!("Timestep {}", ctx.env_steps);
    match (mean_reward, best) {
        (Some(mean), Some(best)) => {
            info!("mean reward ({} episodes) {:.2}", REWARD_WINDOW, mean);
            info!("best mean reward {:.2}", best);
        }
        _ => info!("mean reward: no completed episodes yet"),
    }
    info!("episodes {}", episodes);
    info!("exploration {:.4}", exploration.value_at(step));
    info!("learning_rate {:.2e}", learner.optimizer_spec().learning_rate(step));
}
