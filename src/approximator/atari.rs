use ndarray::{Array2, ArrayView2, ArrayView4};
use rand::rngs::StdRng;

use super::{check_input, FunctionApproximator, ObservationShape};
use crate::activations::Activation;
use crate::error::{DqnError, Result};
use crate::layers::{Conv2DLayer, DenseLayer, WeightInit};
use crate::parameters::ParameterSet;

/// `(filters, kernel, stride)` of each convolution
const CONV_STACK: [(usize, usize, usize); 3] = [(32, 8, 4), (64, 4, 2), (64, 3, 1)];
const HIDDEN_UNITS: usize = 512;

/// The standard Atari DQN architecture.
///
/// Three ReLU convolutions feed a 512-unit ReLU layer and a linear output
/// layer with one unit per action.
#[derive(Clone, Debug)]
pub struct ConvolutionalAtariNet {
    params: ParameterSet,
    convs: Vec<Conv2DLayer>,
    hidden: DenseLayer,
    output: DenseLayer,
    observation_shape: ObservationShape,
    num_actions: usize,
    /// Output shape of the last convolution, needed to unflatten gradients
    conv_out: (usize, usize, usize),
}

impl ConvolutionalAtariNet {
    pub fn new(observation_shape: ObservationShape, num_actions: usize, rng: &mut StdRng) -> Result<Self> {
        let (mut h, mut w, mut c) = observation_shape;
        let mut params = ParameterSet::new();
        let mut convs = Vec::with_capacity(CONV_STACK.len());

        for (i, &(filters, kernel, stride)) in CONV_STACK.iter().enumerate() {
            let conv = Conv2DLayer::new(
                &mut params,
                &format!("convnet/conv_{}", i + 1),
                c,
                filters,
                kernel,
                stride,
                Activation::Relu,
                WeightInit::XavierUniform,
                true,
                rng,
            )?;
            let (oh, ow) = conv.output_hw(h, w).ok_or_else(|| {
                DqnError::configuration(
                    "observation_shape".to_string(),
                    format!("{}x{} frames are too small for the Atari network", observation_shape.0, observation_shape.1),
                )
            })?;
            h = oh;
            w = ow;
            c = filters;
            convs.push(conv);
        }

        let hidden = DenseLayer::new(
            &mut params,
            "action_value/fully_connected",
            h * w * c,
            HIDDEN_UNITS,
            Activation::Relu,
            WeightInit::XavierUniform,
            true,
            rng,
        )?;
        let output = DenseLayer::new(
            &mut params,
            "action_value/fully_connected_1",
            HIDDEN_UNITS,
            num_actions,
            Activation::Linear,
            WeightInit::XavierUniform,
            true,
            rng,
        )?;

        Ok(ConvolutionalAtariNet {
            params,
            convs,
            hidden,
            output,
            observation_shape,
            num_actions,
            conv_out: (h, w, c),
        })
    }
}

impl FunctionApproximator for ConvolutionalAtariNet {
    fn num_actions(&self) -> usize {
        self.num_actions
    }

    fn observation_shape(&self) -> ObservationShape {
        self.observation_shape
    }

    fn forward(&mut self, observations: ArrayView4<f32>) -> Result<Array2<f32>> {
        check_input(&observations, self.observation_shape)?;
        let batch = observations.dim().0;

        let mut x = observations.to_owned();
        for conv in &mut self.convs {
            x = conv.forward_batch(&self.params, x.view())?;
        }
        let (h, w, c) = self.conv_out;
        let flat = x.into_shape((batch, h * w * c))?;
        let hidden = self.hidden.forward_batch(&self.params, flat.view())?;
        self.output.forward_batch(&self.params, hidden.view())
    }

    fn backward(&mut self, output_gradient: ArrayView2<f32>) -> Result<ParameterSet> {
        let mut grads = self.params.zeros_like();
        let err = self.output.backward_batch(&self.params, output_gradient, &mut grads)?;
        let err = self.hidden.backward_batch(&self.params, err.view(), &mut grads)?;

        let (h, w, c) = self.conv_out;
        let mut err = err.into_shape((output_gradient.nrows(), h, w, c))?;
        for (i, conv) in self.convs.iter().enumerate().rev() {
            // The first convolution's input gradient is never needed.
            if let Some(input_err) = conv.backward_batch(&self.params, err.view(), &mut grads, i > 0)? {
                err = input_err;
            }
        }
        Ok(grads)
    }

    fn parameters(&self) -> &ParameterSet {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut ParameterSet {
        &mut self.params
    }
}
