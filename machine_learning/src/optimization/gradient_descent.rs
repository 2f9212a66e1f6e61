use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

/// Plain gradient descent.
#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: f32,
}

impl GradientDescent {
    /// Creates a new `GradientDescent` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for GradientDescent {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params)?;

        let lr = self.learning_rate;

        for (p, g) in params.iter_mut().zip(grad) {
            *p -= lr * g;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MlErr;

    #[test]
    fn steps_against_the_gradient() {
        let mut optimizer = GradientDescent::new(0.5);
        let mut params = [1., 2., 3.];

        optimizer.update_params(&[2., 0., -2.], &mut params).unwrap();
        assert_eq!(params, [0., 2., 4.]);
    }

    #[test]
    fn size_mismatch() {
        let mut optimizer = GradientDescent::new(0.5);

        assert!(matches!(
            optimizer.update_params(&[1.], &mut [1., 2.]),
            Err(MlErr::SizeMismatch { got: 1, expected: 2, .. })
        ));
    }
}
