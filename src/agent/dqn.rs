use log::debug;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayView3, Axis};
use rand::Rng;

use crate::approximator::{copy_parameters, to_network_input, FunctionApproximator};
use crate::error::{DqnError, Result};
use crate::loss::HuberLoss;
use crate::optimizer::{GradientClipper, Optimizer, OptimizerSpec, OptimizerWrapper};
use crate::parameters::ParameterSet;
use crate::replay_buffer::Batch;

/// What one optimization step did
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OptimizationStats {
    pub loss: f32,
    /// Global gradient norm before clipping
    pub grad_norm: f32,
    pub learning_rate: f32,
    /// Whether this step ended with a target synchronization
    pub synced: bool,
}

/// Online/target Q-network pair with its optimizer.
pub struct DqnLearner<Q: FunctionApproximator> {
    online: Q,
    target: Q,
    optimizer: OptimizerWrapper,
    optimizer_spec: OptimizerSpec,
    clipper: GradientClipper,
    loss: HuberLoss,
    gamma: f32,
    target_update_freq: usize,
    num_updates: usize,
}

impl<Q: FunctionApproximator> DqnLearner<Q> {
    /// Pair `online` with `target`, overwriting `target` with `online`'s
    /// parameters so both start identical.
    pub fn new(
        online: Q,
        mut target: Q,
        optimizer_spec: OptimizerSpec,
        gamma: f32,
        grad_norm_clip: f32,
        target_update_freq: usize,
    ) -> Result<Self> {
        if !(0.0..=1.0).contains(&gamma) {
            return Err(DqnError::configuration("gamma".to_string(), format!("{} is outside [0, 1]", gamma)));
        }
        if grad_norm_clip.is_nan() || grad_norm_clip <= 0.0 {
            return Err(DqnError::configuration("grad_norm_clip", "must be positive"));
        }
        if target_update_freq == 0 {
            return Err(DqnError::configuration("target_update_freq", "must be greater than 0"));
        }
        copy_parameters(&online, &mut target)?;

        Ok(DqnLearner {
            online,
            target,
            optimizer: optimizer_spec.build(),
            optimizer_spec,
            clipper: GradientClipper::ClipByGlobalNorm { max_norm: grad_norm_clip },
            loss: HuberLoss::default(),
            gamma,
            target_update_freq,
            num_updates: 0,
        })
    }

    pub fn online(&self) -> &Q {
        &self.online
    }

    pub fn target(&self) -> &Q {
        &self.target
    }

    pub fn num_actions(&self) -> usize {
        self.online.num_actions()
    }

    /// Number of optimization steps applied so far
    pub fn num_updates(&self) -> usize {
        self.num_updates
    }

    pub fn optimizer_spec(&self) -> &OptimizerSpec {
        &self.optimizer_spec
    }

    /// Online network's best action for one stacked observation.
    /// Ties go to the lowest action index.
    pub fn greedy_action(&mut self, observation: ArrayView3<u8>) -> Result<usize> {
        let input = to_network_input(observation.insert_axis(Axis(0)));
        let q_values = self.online.forward(input.view())?;
        argmax(q_values.row(0))
    }

    /// Epsilon-greedy action selection.
    pub fn act<R: Rng + ?Sized>(&mut self, observation: ArrayView3<u8>, epsilon: f64, rng: &mut R) -> Result<usize> {
        if rng.gen::<f64>() < epsilon {
            Ok(rng.gen_range(0..self.num_actions()))
        } else {
            self.greedy_action(observation)
        }
    }

    /// Copy online parameters into the target network.
    pub fn sync_target(&mut self) -> Result<()> {
        copy_parameters(&self.online, &mut self.target)
    }

    /// Load checkpointed parameters into both networks.
    pub fn restore(&mut self, params: &ParameterSet) -> Result<()> {
        self.online.parameters_mut().copy_from(params)?;
        self.sync_target()
    }

    /// One gradient step on `batch`, using the learning rate at `step`.
    ///
    /// Nothing is modified if the loss or gradients turn out non-finite.
    pub fn optimize(&mut self, batch: &Batch, step: i64) -> Result<OptimizationStats> {
        let num_actions = self.num_actions();
        if batch.is_empty() {
            return Err(DqnError::precondition("cannot optimize on an empty batch"));
        }
        if let Some(&bad) = batch.actions.iter().find(|&&a| a >= num_actions) {
            return Err(DqnError::precondition(format!(
                "action {} out of range for {} actions",
                bad, num_actions
            )));
        }

        let next_q = self.target.forward(to_network_input(batch.next_obs.view()).view())?;
        let targets = bootstrap_targets(batch.rewards.view(), next_q.view(), batch.done_mask.view(), self.gamma);

        let q = self.online.forward(to_network_input(batch.obs.view()).view())?;
        let chosen: Array1<f32> = batch
            .actions
            .iter()
            .enumerate()
            .map(|(i, &a)| q[[i, a]])
            .collect();

        let loss = self.loss.compute(chosen.view(), targets.view());
        if !loss.is_finite() {
            return Err(DqnError::NumericInstability(format!("loss is {}", loss)));
        }

        let chosen_grad = self.loss.gradient(chosen.view(), targets.view());
        let mut output_grad = Array2::zeros(q.raw_dim());
        for (i, &a) in batch.actions.iter().enumerate() {
            output_grad[[i, a]] = chosen_grad[i];
        }
        let mut grads = self.online.backward(output_grad.view())?;
        let grad_norm = self.clipper.clip(&mut grads);
        if !grad_norm.is_finite() || !grads.is_finite() {
            return Err(DqnError::NumericInstability(format!("gradient norm is {}", grad_norm)));
        }

        let learning_rate = self.optimizer_spec.learning_rate(step);
        self.optimizer.apply(self.online.parameters_mut(), &grads, learning_rate)?;
        self.num_updates += 1;

        let synced = self.num_updates % self.target_update_freq == 0;
        if synced {
            self.sync_target()?;
            debug!("target network synchronized after {} updates", self.num_updates);
        }

        Ok(OptimizationStats {
            loss,
            grad_norm,
            learning_rate,
            synced,
        })
    }
}

/// Bootstrapped TD targets. Terminal transitions get exactly their reward,
/// whatever the target network predicted.
pub fn bootstrap_targets(
    rewards: ArrayView1<f32>,
    next_q: ArrayView2<f32>,
    done_mask: ArrayView1<f32>,
    gamma: f32,
) -> Array1<f32> {
    rewards
        .iter()
        .zip(next_q.outer_iter())
        .zip(done_mask.iter())
        .map(|((&r, q), &done)| {
            if done > 0.0 {
                r
            } else {
                r + gamma * q.fold(f32::NEG_INFINITY, |a, &b| a.max(b))
            }
        })
        .collect()
}

fn argmax(values: ArrayView1<f32>) -> Result<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            return Err(DqnError::NumericInstability(format!("Q-value {} for action {}", v, i)));
        }
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
        .ok_or_else(|| DqnError::precondition("network produced no Q-values"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_terminal_target_is_reward() {
        let targets = bootstrap_targets(
            array![1.0f32, 1.0].view(),
            array![[f32::NAN, f32::NAN], [2.0, 3.0]].view(),
            array![1.0f32, 0.0].view(),
            0.5,
        );
        assert_eq!(targets[0], 1.0);
        assert_eq!(targets[1], 2.5);
    }

    #[test]
    fn test_argmax_ties_go_to_lowest_index() {
        assert_eq!(argmax(array![1.0f32, 3.0, 3.0].view()).unwrap(), 1);
        assert!(argmax(array![1.0f32, f32::NAN].view()).is_err());
    }
}
