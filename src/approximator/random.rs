use ndarray::{Array2, ArrayView2, ArrayView4};
use rand::rngs::StdRng;

use super::{check_input, FunctionApproximator, ObservationShape};
use crate::activations::Activation;
use crate::error::{DqnError, Result};
use crate::layers::{Conv2DLayer, DenseLayer, WeightInit};
use crate::parameters::ParameterSet;

const KERNEL: usize = 8;
const STRIDE: usize = 4;

/// Random-feature baseline: one frozen, randomly initialized convolution
/// followed by a trained linear value head.
#[derive(Clone, Debug)]
pub struct RandomNet {
    params: ParameterSet,
    features: Conv2DLayer,
    head: DenseLayer,
    observation_shape: ObservationShape,
    num_actions: usize,
    feature_len: usize,
}

impl RandomNet {
    pub fn new(
        observation_shape: ObservationShape,
        num_actions: usize,
        num_filters: usize,
        rng: &mut StdRng,
    ) -> Result<Self> {
        if num_filters == 0 {
            return Err(DqnError::configuration("num_filters", "must be greater than 0"));
        }
        let (h, w, c) = observation_shape;
        let mut params = ParameterSet::new();
        let features = Conv2DLayer::new(
            &mut params,
            "convnet/conv_1",
            c,
            num_filters,
            KERNEL,
            STRIDE,
            Activation::Relu,
            WeightInit::XavierNormal,
            false,
            rng,
        )?;
        let (oh, ow) = features.output_hw(h, w).ok_or_else(|| {
            DqnError::configuration(
                "observation_shape".to_string(),
                format!("frames must be at least {}x{}", KERNEL, KERNEL),
            )
        })?;
        let feature_len = oh * ow * num_filters;
        let head = DenseLayer::new(
            &mut params,
            "action_value/fully_connected",
            feature_len,
            num_actions,
            Activation::Linear,
            WeightInit::XavierUniform,
            true,
            rng,
        )?;

        Ok(RandomNet {
            params,
            features,
            head,
            observation_shape,
            num_actions,
            feature_len,
        })
    }
}

impl FunctionApproximator for RandomNet {
    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn observation_shape(&self) -> ObservationShape {
        self.observation_shape
    }

    fn forward(&mut self, observations: ArrayView4<f32>) -> Result<Array2<f32>> {
        check_input(&observations, self.observation_shape)?;
        let batch = observations.dim().0;
        let features = self.features.forward_batch(&self.params, observations)?;
        let flat = features.into_shape((batch, self.feature_len))?;
        self.head.forward_batch(&self.params, flat.view())
    }

    fn backward(&mut self, output_gradient: ArrayView2<f32>) -> Result<ParameterSet> {
        let mut grads = self.params.zeros_like();
        // Features are frozen, so the error stops at the head.
        self.head.backward_batch(&self.params, output_gradient, &mut grads)?;
        Ok(grads)
    }

    fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;
    use rand::SeedableRng;

    #[test]
    fn test_only_head_is_trainable() {
        let mut net = RandomNet::new((12, 12, 4), 3, 5, &mut StdRng::seed_from_u64(0)).unwrap();
        let params = net.parameters();
        assert!(!params.is_trainable(0) && !params.is_trainable(1));
        assert!(params.is_trainable(2) && params.is_trainable(3));
        assert_eq!(params.get(2).shape(), &[2 * 2 * 5, 3]);

        net.forward(Array4::from_elem((4, 12, 12, 4), 0.5).view()).unwrap();
        let grads = net.backward(Array2::ones((4, 3)).view()).unwrap();
        assert_eq!(grads.get(0).iter().filter(|g| **g != 0.0).count(), 0);
        assert_eq!(grads.get(3).iter().copied().collect::<Vec<_>>(), vec![4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_zero_filters_rejected() {
        assert!(RandomNet::new((12, 12, 4), 3, 0, &mut StdRng::seed_from_u64(0)).is_err());
    }
}
