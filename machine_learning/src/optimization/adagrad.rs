use super::{Optimizer, optimizer::check_sizes};
use crate::{MlErr, Result};

/// Adagrad with element-wise gradient clipping.
///
/// For every parameter: `g = clamp(g, -clip, clip)`, `accum += g²` and
/// `p -= lr * g / sqrt(accum + eps)`.
#[derive(Debug, Clone)]
pub struct Adagrad {
    learning_rate: f32,
    clip: f32,
    epsilon: f32,
    accum: Box<[f32]>,
}

impl Adagrad {
    pub const DEFAULT_CLIP: f32 = 5.;
    pub const DEFAULT_EPSILON: f32 = 1e-8;

    /// Creates a new `Adagrad` optimizer with the default clipping and epsilon.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    pub fn new(len: usize, learning_rate: f32) -> Self {
        Self::with_hyperparams(len, learning_rate, Self::DEFAULT_CLIP, Self::DEFAULT_EPSILON)
    }

    /// Creates a new `Adagrad` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance should hold.
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `clip` - The largest magnitude a gradient value is allowed to have.
    /// * `epsilon` - Added to the accumulator before taking its square root.
    pub fn with_hyperparams(len: usize, learning_rate: f32, clip: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            clip,
            epsilon,
            accum: vec![0.; len].into_boxed_slice(),
        }
    }

    /// Returns the accumulated squared gradients.
    pub fn accumulators(&self) -> &[f32] {
        &self.accum
    }
}

impl Optimizer for Adagrad {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<()> {
        check_sizes(grad, params)?;
        if self.accum.len() != params.len() {
            return Err(MlErr::SizeMismatch {
                what: "accumulators",
                got: self.accum.len(),
                expected: params.len(),
            });
        }

        let Self {
            learning_rate: lr,
            clip,
            epsilon: eps,
            ..
        } = *self;

        params
            .iter_mut()
            .zip(grad)
            .zip(self.accum.iter_mut())
            .for_each(|((p, &g), acc)| {
                let g = g.clamp(-clip, clip);
                *acc += g * g;
                *p -= lr * g / (*acc + eps).sqrt();
            });

        Ok(())
    }
}
