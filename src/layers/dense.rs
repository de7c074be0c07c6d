use ndarray::{Array2, ArrayView2, Axis, Ix2};
use rand::Rng;

use crate::activations::Activation;
use crate::error::{DqnError, Result};
use crate::parameters::ParameterSet;
use super::initialization::WeightInit;

/// A fully connected (dense) layer whose weights live in a [`ParameterSet`].
///
/// The layer keeps only indices into the owning network's parameter set,
/// plus the activations cached by the last forward pass.
#[derive(Clone, Debug)]
pub struct DenseLayer {
    weights: usize,
    biases: Option<usize>,
    pub activation: Activation,
    input_size: usize,
    output_size: usize,
    pre_activation_output: Option<Array2<f32>>,
    inputs: Option<Array2<f32>>,
}

impl DenseLayer {
    /// Register the layer's tensors under `scope` and return the layer.
    #[allow(clippy::too_many_arguments)]
    pub fn new<R: Rng>(
        params: &mut ParameterSet,
        scope: &str,
        input_size: usize,
        output_size: usize,
        activation: Activation,
        init: WeightInit,
        use_bias: bool,
        rng: &mut R,
    ) -> Result<Self> {
        let w = init.initialize(&[input_size, output_size], input_size, output_size, rng)?;
        let weights = params.push(format!("{}/weights", scope), w, true);
        let biases = if use_bias {
            let b = WeightInit::Zeros.initialize(&[output_size], input_size, output_size, rng)?;
            Some(params.push(format!("{}/biases", scope), b, true))
        } else {
            None
        };

        Ok(DenseLayer {
            weights,
            biases,
            activation,
            input_size,
            output_size,
            pre_activation_output: None,
            inputs: None,
        })
    }

    pub fn forward_batch(&mut self, params: &ParameterSet, inputs: ArrayView2<f32>) -> Result<Array2<f32>> {
        if inputs.ncols() != self.input_size {
            return Err(DqnError::dimension_mismatch(
                format!("{} input features", self.input_size),
                format!("{} input features", inputs.ncols()),
            ));
        }
        let weights = params.get(self.weights).view().into_dimensionality::<Ix2>()?;
        let mut outputs = inputs.dot(&weights);
        if let Some(b) = self.biases {
            let biases = params.get(b).view().into_shape(self.output_size)?;
            outputs += &biases.insert_axis(Axis(0));
        }
        self.inputs = Some(inputs.to_owned());
        self.pre_activation_output = Some(outputs.clone());
        self.activation.apply_batch(&mut outputs);
        Ok(outputs)
    }

    /// Accumulate this layer's gradients into `grads` and return the error
    /// with respect to the layer's inputs.
    pub fn backward_batch(
        &self,
        params: &ParameterSet,
        output_errors: ArrayView2<f32>,
        grads: &mut ParameterSet,
    ) -> Result<Array2<f32>> {
        let pre_activation_output = self.pre_activation_output.as_ref()
            .ok_or_else(|| DqnError::precondition("forward_batch() must be called before backward_batch()"))?;
        let inputs = self.inputs.as_ref()
            .ok_or_else(|| DqnError::precondition("forward_batch() must be called before backward_batch()"))?;

        let activation_deriv = self.activation.derivative_batch(pre_activation_output.view());
        let adjusted_error = output_errors.to_owned() * &activation_deriv;

        if params.is_trainable(self.weights) {
            let weight_gradients = inputs.t().dot(&adjusted_error);
            *grads.get_mut(self.weights) += &weight_gradients.into_dyn();
        }
        if let Some(b) = self.biases {
            if params.is_trainable(b) {
                let bias_gradients = adjusted_error.sum_axis(Axis(0));
                *grads.get_mut(b) += &bias_gradients.into_dyn();
            }
        }

        let weights = params.get(self.weights).view().into_dimensionality::<Ix2>()?;
        Ok(adjusted_error.dot(&weights.t()))
    }
}
