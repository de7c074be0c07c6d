use ndarray::{Array1, ArrayView1};

/// Huber loss (smooth L1), averaged over the batch.
///
/// Quadratic for `|x| <= delta`, linear beyond, so large TD errors produce
/// bounded gradients.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HuberLoss {
    pub delta: f32,
}

impl Default for HuberLoss {
    fn default() -> Self {
        HuberLoss { delta: 1.0 }
    }
}

impl HuberLoss {
    pub fn new(delta: f32) -> Self {
        HuberLoss { delta }
    }

    fn elementwise(&self, x: f32) -> f32 {
        let abs_x = x.abs();
        if abs_x <= self.delta {
            0.5 * x * x
        } else {
            self.delta * (abs_x - 0.5 * self.delta)
        }
    }

    /// Mean loss of `predictions` against `targets`. An empty batch has zero loss.
    pub fn compute(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> f32 {
        if predictions.is_empty() {
            return 0.0;
        }
        let diff = &predictions - &targets;
        diff.mapv(|x| self.elementwise(x)).sum() / predictions.len() as f32
    }

    /// Gradient of [`compute`](Self::compute) with respect to `predictions`.
    pub fn gradient(&self, predictions: ArrayView1<f32>, targets: ArrayView1<f32>) -> Array1<f32> {
        let n = predictions.len().max(1) as f32;
        let diff = &predictions - &targets;
        diff.mapv(|x| x.clamp(-self.delta, self.delta) / n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_quadratic_and_linear_regions() {
        let loss = HuberLoss::default();
        let pred = array![0.5f32, 3.0];
        let target = array![0.0f32, 0.0];
        // 0.5 * 0.25 = 0.125, and 1 * (3 - 0.5) = 2.5
        assert!((loss.compute(pred.view(), target.view()) - (0.125 + 2.5) / 2.0).abs() < 1e-6);
        assert_eq!(loss.gradient(pred.view(), target.view()), array![0.25, 0.5]);
    }

    #[test]
    fn test_zero_at_target() {
        let loss = HuberLoss::new(1.0);
        let x = array![1.0f32, -2.0, 7.5];
        assert_eq!(loss.compute(x.view(), x.view()), 0.0);
        assert!(loss.gradient(x.view(), x.view()).iter().all(|&g| g == 0.0));
    }
}
