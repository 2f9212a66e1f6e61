use crate::{MlErr, Result};

/// A `ParamGen` generates values for the initial state of the model's parameters.
pub trait ParamGen {
    /// Should sample at most `n` parameters.
    ///
    /// # Arguments
    /// * `n` - The upper limit of samples to generate.
    ///
    /// # Returns
    /// An option whether the generator is exhausted.
    fn sample(&mut self, n: usize) -> Option<Vec<f32>>;

    /// Samples exactly `n` parameters, sampling as many times as needed.
    ///
    /// # Returns
    /// The parameters or an error if the generator ran out before reaching `n`.
    fn sample_exact(&mut self, n: usize) -> Result<Vec<f32>> {
        let mut params = Vec::with_capacity(n);

        while params.len() < n {
            match self.sample(n - params.len()) {
                Some(sample) if !sample.is_empty() => params.extend(sample),
                _ => {
                    return Err(MlErr::ParamGenExhausted {
                        got: params.len(),
                        expected: n,
                    });
                }
            }
        }

        Ok(params)
    }
}

impl<G: ParamGen + ?Sized> ParamGen for Box<G> {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        (**self).sample(n)
    }
}
