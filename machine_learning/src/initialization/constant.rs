use super::ParamGen;

/// A parameter generator that always generates the same value.
///
/// Used for the projection biases, which start at zero.
pub struct ConstParamGen {
    value: f32,
    remaining: usize,
}

impl ConstParamGen {
    /// Creates a new `ConstParamGen` parameter generator.
    ///
    /// # Arguments
    /// * `value` - The value to always generate.
    /// * `limit` - The maximum amount of times to generate that value.
    pub fn new(value: f32, limit: usize) -> Self {
        Self {
            value,
            remaining: limit,
        }
    }

    /// Creates a generator of `limit` zeros.
    pub fn zeros(limit: usize) -> Self {
        Self::new(0., limit)
    }
}

impl ParamGen for ConstParamGen {
    fn sample(&mut self, n: usize) -> Option<Vec<f32>> {
        if self.remaining == 0 {
            return None;
        }

        let n = n.min(self.remaining);
        self.remaining -= n;
        Some(vec![self.value; n])
    }
}
