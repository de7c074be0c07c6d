use ndarray::{ArrayD, IxDyn};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::{Normal, Uniform};

use crate::error::{DqnError, Result};

/// Weight initialization strategies
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WeightInit {
    /// Xavier/Glorot uniform initialization
    XavierUniform,

    /// Xavier/Glorot normal initialization
    XavierNormal,

    /// He/Kaiming normal initialization (for ReLU)
    HeNormal,

    /// All zeros
    Zeros,
}

impl WeightInit {
    /// Draw a tensor of `shape` given the layer's fan-in and fan-out.
    pub fn initialize<R: Rng>(
        &self,
        shape: &[usize],
        fan_in: usize,
        fan_out: usize,
        rng: &mut R,
    ) -> Result<ArrayD<f32>> {
        let shape = IxDyn(shape);

        match self {
            WeightInit::XavierUniform => {
                let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
                Ok(ArrayD::random_using(shape, Uniform::new(-limit, limit), rng))
            }

            WeightInit::XavierNormal => {
                let std = (2.0 / (fan_in + fan_out) as f32).sqrt();
                Ok(ArrayD::random_using(shape, normal(std)?, rng))
            }

            WeightInit::HeNormal => {
                let std = (2.0 / fan_in as f32).sqrt();
                Ok(ArrayD::random_using(shape, normal(std)?, rng))
            }

            WeightInit::Zeros => Ok(ArrayD::zeros(shape)),
        }
    }
}

fn normal(std: f32) -> Result<Normal<f32>> {
    Normal::new(0.0, std).map_err(|e| DqnError::configuration("weight_init".to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_xavier_uniform_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let w = WeightInit::XavierUniform.initialize(&[30, 20], 30, 20, &mut rng).unwrap();
        let limit = (6.0f32 / 50.0).sqrt();
        assert_eq!(w.shape(), &[30, 20]);
        assert!(w.iter().all(|x| x.abs() <= limit));
    }

    #[test]
    fn test_seeded_init_is_reproducible() {
        let a = WeightInit::HeNormal
            .initialize(&[4, 4], 4, 4, &mut StdRng::seed_from_u64(9))
            .unwrap();
        let b = WeightInit::HeNormal
            .initialize(&[4, 4], 4, 4, &mut StdRng::seed_from_u64(9))
            .unwrap();
        assert_eq!(a, b);
    }
}
