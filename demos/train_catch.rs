//! Train a Q-network on the pixel Catch game.
//!
//! ```text
//! cargo run --release --example train_catch -- --model simple --timesteps 20000
//! RUST_LOG=info cargo run --example train_catch -- --config catch.yaml
//! ```

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use log::info;
use pixel_dqn::{
    approximator::ModelKind,
    checkpoint::{inspect_parameter, BincodeCheckpointStore},
    config::LearnConfig,
    env::{Catch, ClipReward, Environment, MaxAndSkip, Monitor},
    learn, presets,
    schedule::Schedule,
    Result,
};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Model {
    Atari,
    Simple,
    FeatureLinear,
}

#[derive(Parser, Debug)]
#[command(version, about = "Train DQN on pixel Catch")]
struct Args {
    /// Minibatch size
    #[arg(long, default_value_t = 32)]
    batch_size: usize,

    /// Q-network architecture
    #[arg(long, value_enum, default_value_t = Model::Simple)]
    model: Model,

    /// Filters of the random convolution (simple model only)
    #[arg(long, default_value_t = 16)]
    num_filters: usize,

    /// Raw environment steps to train for
    #[arg(long, default_value_t = 20_000)]
    timesteps: usize,

    /// Checkpoint to start from
    #[arg(long)]
    restore: Option<PathBuf>,

    /// Directory for model checkpoints
    #[arg(long, default_value = "checkpoints")]
    ckpt_dir: PathBuf,

    /// Steps of random play before the first update
    #[arg(long, default_value_t = 1_000)]
    learning_starts: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Grid cells per side
    #[arg(long, default_value_t = 10)]
    grid_size: usize,

    /// Pixels per grid cell
    #[arg(long, default_value_t = 4)]
    pixel_scale: usize,

    /// Repeat each action this many frames (1 disables frame skipping)
    #[arg(long, default_value_t = 1)]
    frame_skip: usize,

    /// YAML file with the training loop settings, in place of the loop flags
    #[arg(
        long,
        conflicts_with_all = ["batch_size", "learning_starts", "seed", "restore", "ckpt_dir"]
    )]
    config: Option<PathBuf>,
}

impl Args {
    fn model_kind(&self) -> ModelKind {
        match self.model {
            Model::Atari => ModelKind::Atari,
            Model::Simple => ModelKind::Simple { num_filters: self.num_filters },
            Model::FeatureLinear => ModelKind::FeatureLinear,
        }
    }

    fn learn_config(&self) -> Result<LearnConfig> {
        if let Some(path) = &self.config {
            return LearnConfig::load(path);
        }
        Ok(LearnConfig::default()
            .replay_capacity(50_000)
            .batch_size(self.batch_size)
            .learning_starts(self.learning_starts)
            .frame_history_len(2)
            .target_update_freq(1_000)
            .checkpoint_interval(5_000)
            .log_interval(1_000)
            .seed(self.seed)
            .checkpoint_dir(&self.ckpt_dir)
            .restore_path(self.restore.clone()))
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = args.learn_config()?;
    let model = args.model_kind();

    let catch = Monitor::new(Catch::new(args.grid_size, args.pixel_scale, config.seed)?);
    let mut env: Box<dyn Environment> = if args.frame_skip > 1 {
        Box::new(ClipReward::new(MaxAndSkip::new(catch, args.frame_skip)?))
    } else {
        Box::new(ClipReward::new(catch))
    };

    // Catch episodes are short, so anneal exploration over a fifth of the run.
    let anneal = (args.timesteps / 5).max(1) as u64;
    let exploration = Schedule::linear(anneal, 1.0, 0.05)?;
    let optimizer = presets::optimizer_spec(model, args.timesteps as u64, 10.0)?;

    info!("Training {:?} for {} steps", model, args.timesteps);
    let path = learn(
        &mut env,
        &model,
        optimizer,
        &exploration,
        presets::stop_after(args.timesteps, Monitor::<Catch>::COUNTER),
        &config,
    )?;

    if let Some(rewards) = env.episode_rewards() {
        let tail = &rewards[rewards.len().saturating_sub(100)..];
        if !tail.is_empty() {
            let mean = tail.iter().sum::<f32>() / tail.len() as f32;
            println!("mean reward (last {} episodes): {:.3}", tail.len(), mean);
        }
    }

    let norms = inspect_parameter(&BincodeCheckpointStore, &path, "action_value/fully_connected/weights")?;
    println!("final checkpoint: {}", path.display());
    println!(
        "action_value/fully_connected/weights {:?}  inf-norm {:.4}  frobenius {:.4}",
        norms.shape, norms.inf_norm, norms.frobenius
    );
    Ok(())
}
