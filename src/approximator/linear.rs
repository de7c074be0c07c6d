use ndarray::{Array2, ArrayView2, ArrayView4};
use rand::rngs::StdRng;

use super::{check_input, FunctionApproximator, ObservationShape};
use crate::activations::Activation;
use crate::error::Result;
use crate::layers::{DenseLayer, WeightInit};
use crate::parameters::ParameterSet;

/// One bias-free dense layer over the flattened pixels.
#[derive(Clone, Debug)]
pub struct LinearFeatureNet {
    params: ParameterSet,
    layer: DenseLayer,
    observation_shape: ObservationShape,
    num_actions: usize,
}

impl LinearFeatureNet {
    pub fn new(observation_shape: ObservationShape, num_actions: usize, rng: &mut StdRng) -> Result<Self> {
        let (h, w, c) = observation_shape;
        let mut params = ParameterSet::new();
        let layer = DenseLayer::new(
            &mut params,
            "action_value/fully_connected",
            h * w * c,
            num_actions,
            Activation::Relu,
            WeightInit::XavierNormal,
            false,
            rng,
        )?;
        Ok(LinearFeatureNet {
            params,
            layer,
            observation_shape,
            num_actions,
        })
    }
}

impl FunctionApproximator for LinearFeatureNet {
    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn observation_shape(&self) -> ObservationShape {
        self.observation_shape
    }

    fn forward(&mut self, observations: ArrayView4<f32>) -> Result<Array2<f32>> {
        check_input(&observations, self.observation_shape)?;
        let (batch, h, w, c) = observations.dim();
        let flat = observations
            .as_standard_layout()
            .into_owned()
            .into_shape((batch, h * w * c))?;
        self.layer.forward_batch(&self.params, flat.view())
    }

    fn backward(&mut self, output_gradient: ArrayView2<f32>) -> Result<ParameterSet> {
        let mut grads = self.params.zeros_like();
        self.layer.backward_batch(&self.params, output_gradient, &mut grads)?;
        Ok(grads)
    }

    fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }
}
