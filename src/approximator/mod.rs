//! # Q-value function approximators
//!
//! Every network maps a batch of stacked observations
//! `[batch, height, width, channels * history]` to Q-values `[batch, num_actions]`.
//! Parameters live in a [`ParameterSet`] so the learner can copy them between
//! the online and target networks and checkpoint them without knowing the
//! architecture.

mod atari;
mod linear;
mod random;

use ndarray::{Array2, Array4, ArrayView2, ArrayView4};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{DqnError, Result};
use crate::parameters::ParameterSet;

pub use atari::ConvolutionalAtariNet;
pub use linear::LinearFeatureNet;
pub use random::RandomNet;

/// Observation shape seen by a network: `(height, width, channels)`.
pub type ObservationShape = (usize, usize, usize);

/// A differentiable map from observations to per-action values.
pub trait FunctionApproximator {
    fn num_actions(&self) -> usize;

    fn observation_shape(&self) -> ObservationShape;

    /// Q-values for a batch. Caches whatever [`backward`](Self::backward) needs.
    fn forward(&mut self, observations: ArrayView4<f32>) -> Result<Array2<f32>>;

    /// Gradients of the loss with respect to every parameter, given the loss
    /// gradient with respect to the last forward pass's output. Frozen
    /// parameters get zero gradients.
    fn backward(&mut self, output_gradient: ArrayView2<f32>) -> Result<ParameterSet>;

    fn parameters(&self) -> &ParameterSet;

    fn parameters_mut(&mut self) -> &mut ParameterSet;
}

/// Builds identically shaped networks, used for both online and target copies.
pub trait ApproximatorFactory {
    type Output: FunctionApproximator;

    fn build(
        &self,
        observation_shape: ObservationShape,
        num_actions: usize,
        rng: &mut StdRng,
    ) -> Result<Self::Output>;
}

/// Architectures the trainer can build by name
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    /// Three convolutions and two dense layers
    Atari,
    /// Frozen random convolution with a trained linear head
    Simple { num_filters: usize },
    /// One dense layer over raw pixels
    FeatureLinear,
}

impl ApproximatorFactory for ModelKind {
    type Output = QNetwork;

    fn build(
        &self,
        observation_shape: ObservationShape,
        num_actions: usize,
        rng: &mut StdRng,
    ) -> Result<QNetwork> {
        if num_actions == 0 {
            return Err(DqnError::configuration("num_actions", "must be greater than 0"));
        }
        Ok(match *self {
            ModelKind::Atari => {
                QNetwork::Atari(ConvolutionalAtariNet::new(observation_shape, num_actions, rng)?)
            }
            ModelKind::Simple { num_filters } => {
                QNetwork::Random(RandomNet::new(observation_shape, num_actions, num_filters, rng)?)
            }
            ModelKind::FeatureLinear => {
                QNetwork::Linear(LinearFeatureNet::new(observation_shape, num_actions, rng)?)
            }
        })
    }
}

/// Any of the built-in architectures
#[derive(Clone, Debug)]
pub enum QNetwork {
    Atari(ConvolutionalAtariNet),
    Random(RandomNet),
    Linear(LinearFeatureNet),
}

macro_rules! dispatch {
    ($self:ident, $net:ident => $body:expr) => {
        match $self {
            QNetwork::Atari($net) => $body,
            QNetwork::Random($net) => $body,
            QNetwork::Linear($net) => $body,
        }
    };
}

impl FunctionApproximator for QNetwork {
    fn num_actions(&self) -> usize {
        dispatch!(self, net => net.num_actions())
    }

    fn observation_shape(&self) -> ObservationShape {
        dispatch!(self, net => net.observation_shape())
    }

    fn forward(&mut self, observations: ArrayView4<f32>) -> Result<Array2<f32>> {
        dispatch!(self, net => net.forward(observations))
    }

    fn backward(&mut self, output_gradient: ArrayView2<f32>) -> Result<ParameterSet> {
        dispatch!(self, net => net.backward(output_gradient))
    }

    fn parameters(&self) -> &ParameterSet {
        dispatch!(self, net => net.parameters())
    }

    fn parameters_mut(&mut self) -> &mut ParameterSet {
        dispatch!(self, net => net.parameters_mut())
    }
}

/// Overwrite `dst`'s parameters with `src`'s.
pub fn copy_parameters<A, B>(src: &A, dst: &mut B) -> Result<()>
where
    A: FunctionApproximator + ?Sized,
    B: FunctionApproximator + ?Sized,
{
    dst.parameters_mut().copy_from(src.parameters())
}

/// Scale raw pixels into `[0, 1]`.
pub fn to_network_input(frames: ArrayView4<u8>) -> Array4<f32> {
    frames.mapv(|p| f32::from(p) / 255.0)
}

pub(crate) fn check_input(observations: &ArrayView4<f32>, expected: ObservationShape) -> Result<()> {
    let (_, h, w, c) = observations.dim();
    if (h, w, c) != expected {
        return Err(DqnError::dimension_mismatch(
            format!("observations of shape {:?}", expected),
            format!("{:?}", (h, w, c)),
        ));
    }
    Ok(())
}
