//! # Optimizers
//!
//! Parameter update rules over a [`ParameterSet`], plus the
//! [`OptimizerSpec`] that pairs an update rule with a learning-rate
//! [`Schedule`]. Frozen parameters are never touched.

pub mod gradient_clipper;

use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{DqnError, Result};
use crate::parameters::ParameterSet;
use crate::schedule::Schedule;

pub use gradient_clipper::GradientClipper;

pub trait Optimizer {
    /// Apply one update step of `grads` to `params` at `learning_rate`.
    fn apply(&mut self, params: &mut ParameterSet, grads: &ParameterSet, learning_rate: f32) -> Result<()>;
}

fn check_layout(params: &ParameterSet, grads: &ParameterSet) -> Result<()> {
    if params.len() != grads.len() {
        return Err(DqnError::dimension_mismatch(
            format!("{} gradient tensors", params.len()),
            format!("{} gradient tensors", grads.len()),
        ));
    }
    for (p, g) in params.iter().zip(grads.iter()) {
        if p.value.shape() != g.value.shape() {
            return Err(DqnError::dimension_mismatch(
                format!("{} {:?}", p.name, p.value.shape()),
                format!("{} {:?}", g.name, g.value.shape()),
            ));
        }
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum OptimizerWrapper {
    SGD(SGD),
    Adam(Adam),
}

impl Optimizer for OptimizerWrapper {
    fn apply(&mut self, params: &mut ParameterSet, grads: &ParameterSet, learning_rate: f32) -> Result<()> {
        match self {
            OptimizerWrapper::SGD(optimizer) => optimizer.apply(params, grads, learning_rate),
            OptimizerWrapper::Adam(optimizer) => optimizer.apply(params, grads, learning_rate),
        }
    }
}

/// Plain gradient descent
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct SGD;

impl SGD {
    pub fn new() -> SGD {
        SGD
    }
}

impl Optimizer for SGD {
    fn apply(&mut self, params: &mut ParameterSet, grads: &ParameterSet, learning_rate: f32) -> Result<()> {
        check_layout(params, grads)?;
        for (p, g) in params.iter_mut().zip(grads.iter()) {
            if !p.trainable {
                continue;
            }
            p.value.zip_mut_with(&g.value, |w, &g| *w -= learning_rate * g);
        }
        Ok(())
    }
}

/// Adam with bias-corrected moment estimates.
///
/// Moment buffers are allocated on the first update to match the layout of
/// the parameter set being optimized.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    m: Vec<ArrayD<f32>>,
    v: Vec<ArrayD<f32>>,
    pub t: i32,
}

impl Adam {
    pub fn new(beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn apply(&mut self, params: &mut ParameterSet, grads: &ParameterSet, learning_rate: f32) -> Result<()> {
        check_layout(params, grads)?;
        if self.m.is_empty() {
            self.m = params.iter().map(|p| ArrayD::zeros(p.value.raw_dim())).collect();
            self.v = self.m.clone();
        } else if self.m.len() != params.len() {
            return Err(DqnError::dimension_mismatch(
                format!("{} moment buffers", self.m.len()),
                format!("{} parameters", params.len()),
            ));
        }

        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);

        for ((p, g), (m, v)) in params
            .iter_mut()
            .zip(grads.iter())
            .zip(self.m.iter_mut().zip(self.v.iter_mut()))
        {
            if !p.trainable {
                continue;
            }
            m.zip_mut_with(&g.value, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
            v.zip_mut_with(&g.value, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);

            Zip::from(&mut p.value)
                .and(&*m)
                .and(&*v)
                .par_for_each(|w, &m, &v| {
                    let m_hat = m / bias1;
                    let v_hat = v / bias2;
                    *w -= learning_rate * m_hat / (v_hat.sqrt() + epsilon);
                });
        }
        Ok(())
    }
}

/// Update rule without a learning rate
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum OptimizerKind {
    Sgd,
    Adam { beta1: f32, beta2: f32, epsilon: f32 },
}

/// An optimizer constructor paired with a learning-rate schedule.
///
/// The schedule is indexed by the number of environment steps taken so far.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OptimizerSpec {
    pub kind: OptimizerKind,
    pub lr_schedule: Schedule,
}

impl OptimizerSpec {
    pub fn adam(epsilon: f32, lr_schedule: Schedule) -> Self {
        OptimizerSpec {
            kind: OptimizerKind::Adam { beta1: 0.9, beta2: 0.999, epsilon },
            lr_schedule,
        }
    }

    pub fn sgd(lr_schedule: Schedule) -> Self {
        OptimizerSpec {
            kind: OptimizerKind::Sgd,
            lr_schedule,
        }
    }

    /// Fresh optimizer with empty state.
    pub fn build(&self) -> OptimizerWrapper {
        match self.kind {
            OptimizerKind::Sgd => OptimizerWrapper::SGD(SGD::new()),
            OptimizerKind::Adam { beta1, beta2, epsilon } => {
                OptimizerWrapper::Adam(Adam::new(beta1, beta2, epsilon))
            }
        }
    }

    pub fn learning_rate(&self, step: i64) -> f32 {
        self.lr_schedule.value_at(step) as f32
    }
}
