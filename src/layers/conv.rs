//! 2D convolution over channel-last image batches
//!
//! Inputs are `[batch, height, width, channels]` with no padding ("valid"
//! convolution). Kernels are stored as `[kernel_h, kernel_w, in_channels,
//! out_channels]` so that a flattened image patch lines up with a row of the
//! reshaped kernel matrix, and the convolution becomes one matrix product.

use ndarray::{s, Array2, Array4, ArrayView4, Axis};
use rand::Rng;

use crate::activations::Activation;
use crate::error::{DqnError, Result};
use crate::layers::initialization::WeightInit;
use crate::parameters::ParameterSet;

/// 2D Convolutional Layer
#[derive(Clone, Debug)]
pub struct Conv2DLayer {
    kernels: usize,
    biases: usize,

    /// Activation function
    pub activation: Activation,

    /// Stride for convolution
    pub stride: usize,

    /// Number of input channels
    pub in_channels: usize,

    /// Number of output channels (filters)
    pub out_channels: usize,

    /// Kernel size
    pub kernel_size: usize,

    /// Flattened patches of the last input, `[batch * out_h * out_w, k * k * in_channels]`
    cached_patches: Option<Array2<f32>>,

    /// Input shape of the last forward pass
    cached_input_dim: Option<(usize, usize, usize, usize)>,

    /// Cached pre-activation output in patch-row layout
    cached_pre_activation: Option<Array2<f32>>,
}

impl Conv2DLayer {
    /// Register a convolution's tensors under `scope`.
    #[allow(clippy::too_many_arguments)]
    pub fn new<R: Rng>(
        params: &mut ParameterSet,
        scope: &str,
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        activation: Activation,
        init: WeightInit,
        trainable: bool,
        rng: &mut R,
    ) -> Result<Self> {
        if kernel_size == 0 || stride == 0 {
            return Err(DqnError::configuration(
                "conv",
                "kernel size and stride must be greater than 0",
            ));
        }
        let fan_in = in_channels * kernel_size * kernel_size;
        let fan_out = out_channels * kernel_size * kernel_size;

        let k = init.initialize(
            &[kernel_size, kernel_size, in_channels, out_channels],
            fan_in,
            fan_out,
            rng,
        )?;
        let b = WeightInit::Zeros.initialize(&[out_channels], fan_in, fan_out, rng)?;
        let kernels = params.push(format!("{}/weights", scope), k, trainable);
        let biases = params.push(format!("{}/biases", scope), b, trainable);

        Ok(Conv2DLayer {
            kernels,
            biases,
            activation,
            stride,
            in_channels,
            out_channels,
            kernel_size,
            cached_patches: None,
            cached_input_dim: None,
            cached_pre_activation: None,
        })
    }

    /// Spatial output size for an input of `(height, width)`, if it fits.
    pub fn output_hw(&self, height: usize, width: usize) -> Option<(usize, usize)> {
        if height < self.kernel_size || width < self.kernel_size {
            return None;
        }
        Some((
            (height - self.kernel_size) / self.stride + 1,
            (width - self.kernel_size) / self.stride + 1,
        ))
    }

    fn kernel_matrix<'a>(&self, params: &'a ParameterSet) -> Result<ndarray::ArrayView2<'a, f32>> {
        let rows = self.kernel_size * self.kernel_size * self.in_channels;
        Ok(params.get(self.kernels).view().into_shape((rows, self.out_channels))?)
    }

    /// Unroll every receptive field of `input` into one row.
    fn im2col(&self, input: ArrayView4<f32>, out_h: usize, out_w: usize) -> Array2<f32> {
        let (batch_size, _, _, _) = input.dim();
        let k = self.kernel_size;
        let mut patches = Array2::zeros((batch_size * out_h * out_w, k * k * self.in_channels));

        let mut row = 0;
        for b in 0..batch_size {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let h0 = oh * self.stride;
                    let w0 = ow * self.stride;
                    let patch = input.slice(s![b, h0..h0 + k, w0..w0 + k, ..]);
                    for (dst, &src) in patches.row_mut(row).iter_mut().zip(patch.iter()) {
                        *dst = src;
                    }
                    row += 1;
                }
            }
        }
        patches
    }

    /// Forward pass for batch of images [batch, height, width, channels]
    pub fn forward_batch(&mut self, params: &ParameterSet, input: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (batch_size, height, width, channels) = input.dim();
        if channels != self.in_channels {
            return Err(DqnError::dimension_mismatch(
                format!("{} input channels", self.in_channels),
                format!("{} input channels", channels),
            ));
        }
        let (out_h, out_w) = self.output_hw(height, width).ok_or_else(|| {
            DqnError::dimension_mismatch(
                format!("input of at least {}x{}", self.kernel_size, self.kernel_size),
                format!("{}x{}", height, width),
            )
        })?;

        let patches = self.im2col(input, out_h, out_w);
        let biases = params.get(self.biases).view().into_shape(self.out_channels)?;
        let mut output = patches.dot(&self.kernel_matrix(params)?) + &biases.insert_axis(Axis(0));

        self.cached_pre_activation = Some(output.clone());
        self.cached_patches = Some(patches);
        self.cached_input_dim = Some((batch_size, height, width, channels));

        self.activation.apply_batch(&mut output);
        Ok(output.into_shape((batch_size, out_h, out_w, self.out_channels))?)
    }

    /// Backward pass.
    ///
    /// Accumulates kernel and bias gradients into `grads` (unless the layer is
    /// frozen) and, when `propagate` is set, returns the gradient with respect
    /// to the input.
    pub fn backward_batch(
        &self,
        params: &ParameterSet,
        output_gradient: ArrayView4<f32>,
        grads: &mut ParameterSet,
        propagate: bool,
    ) -> Result<Option<Array4<f32>>> {
        let patches = self.cached_patches.as_ref()
            .ok_or_else(|| DqnError::precondition("Forward pass must be called before backward"))?;
        let pre_activation = self.cached_pre_activation.as_ref()
            .ok_or_else(|| DqnError::precondition("Forward pass must be called before backward"))?;
        let (batch_size, height, width, channels) = self.cached_input_dim
            .ok_or_else(|| DqnError::precondition("Forward pass must be called before backward"))?;

        let rows = pre_activation.nrows();
        let grad = output_gradient
            .as_standard_layout()
            .into_owned()
            .into_shape((rows, self.out_channels))?;
        let adjusted = grad * &self.activation.derivative_batch(pre_activation.view());

        if params.is_trainable(self.kernels) {
            let kernel_gradients = patches.t().dot(&adjusted);
            let kernel_shape = params.get(self.kernels).raw_dim();
            *grads.get_mut(self.kernels) += &kernel_gradients.into_shape(kernel_shape)?;
        }
        if params.is_trainable(self.biases) {
            *grads.get_mut(self.biases) += &adjusted.sum_axis(Axis(0)).into_dyn();
        }

        if !propagate {
            return Ok(None);
        }

        // Scatter patch gradients back onto the input grid.
        let patch_grads = adjusted.dot(&self.kernel_matrix(params)?.t());
        let (_, out_h, out_w, _) = output_gradient.dim();
        let k = self.kernel_size;
        let mut input_grad = Array4::zeros((batch_size, height, width, channels));
        let mut row = 0;
        for b in 0..batch_size {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let h0 = oh * self.stride;
                    let w0 = ow * self.stride;
                    let mut window = input_grad.slice_mut(s![b, h0..h0 + k, w0..w0 + k, ..]);
                    for (dst, &src) in window.iter_mut().zip(patch_grads.row(row).iter()) {
                        *dst += src;
                    }
                    row += 1;
                }
            }
        }
        Ok(Some(input_grad))
    }
}
