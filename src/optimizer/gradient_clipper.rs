use serde::{Deserialize, Serialize};

use crate::parameters::ParameterSet;

/// Gradient clipping methods
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum GradientClipper {
    /// Rescale every gradient uniformly so the joint L2 norm is at most `max_norm`
    ClipByGlobalNorm { max_norm: f32 },

    /// No clipping
    None,
}

impl GradientClipper {
    /// Clip `grads` in place and return the norm measured before clipping.
    pub fn clip(&self, grads: &mut ParameterSet) -> f32 {
        let global_norm = grads.global_norm();
        if let GradientClipper::ClipByGlobalNorm { max_norm } = *self {
            if global_norm > max_norm && global_norm > 0.0 {
                grads.scale(max_norm / global_norm);
            }
        }
        global_norm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_global_norm_clipping_preserves_direction() {
        let mut grads = ParameterSet::new();
        grads.push("w", array![30.0f32, 0.0].into_dyn(), true);
        grads.push("b", array![40.0f32].into_dyn(), true);

        let norm = GradientClipper::ClipByGlobalNorm { max_norm: 10.0 }.clip(&mut grads);

        assert!((norm - 50.0).abs() < 1e-4);
        assert!((grads.global_norm() - 10.0).abs() < 1e-4);
        assert!((grads.get(0)[[0]] - 6.0).abs() < 1e-4);
        assert!((grads.get(1)[[0]] - 8.0).abs() < 1e-4);
    }

    #[test]
    fn test_small_gradients_untouched() {
        let mut grads = ParameterSet::new();
        grads.push("w", array![0.3f32, 0.4].into_dyn(), true);
        GradientClipper::ClipByGlobalNorm { max_norm: 10.0 }.clip(&mut grads);
        assert_eq!(grads.get(0), &array![0.3f32, 0.4].into_dyn());
        assert_eq!(GradientClipper::None.clip(&mut grads), grads.global_norm());
    }
}
