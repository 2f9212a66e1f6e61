use ndarray::{Axis, CowArray, Ix2, linalg, prelude::*};

use crate::{MlErr, Result};

/// The per step losses and the gradient with respect to the projected hidden states.
#[derive(Debug, Clone)]
pub struct SoftmaxOutput {
    /// `[steps, batch]`
    pub loss: Array2<f32>,
    /// `[steps, batch, units]`
    pub h_grad: Array3<f32>,
}

/// Sparse softmax cross entropy over a dense projection of the hidden states.
///
/// `logits = h w_yᵀ + b_y` with `w_y` being `[classes, units]` and `b_y` being `[classes]`.
#[derive(Debug, Clone, Copy)]
pub struct SoftmaxLoss {
    classes: usize,
    units: usize,
}

impl SoftmaxLoss {
    /// Creates a new `SoftmaxLoss`.
    ///
    /// # Arguments
    /// * `classes` - The amount of event classes, the width of the logits.
    /// * `units` - The width of the hidden states.
    pub fn new(classes: usize, units: usize) -> Self {
        Self { classes, units }
    }

    /// Returns the lengths of the weights and biases buffers.
    pub fn sizes(&self) -> (usize, usize) {
        (self.classes * self.units, self.classes)
    }

    /// Computes the loss of every step without any gradient.
    ///
    /// # Arguments
    /// * `h` - The hidden states, `[steps, batch, units]`.
    /// * `y` - The label of every step, `[steps, batch]`.
    /// * `w_y` - The projection weights.
    /// * `b_y` - The projection biases.
    pub fn forward(
        &self,
        h: ArrayView3<f32>,
        y: ArrayView2<usize>,
        w_y: &[f32],
        b_y: &[f32],
    ) -> Result<Array2<f32>> {
        let (steps, batch, _) = h.dim();
        let h2 = self.flatten(&h, y)?;
        let logits = self.logits(&h2.view(), w_y, b_y)?;
        let mut loss = Array1::zeros(steps * batch);

        for ((loss, row), label) in loss.iter_mut().zip(logits.rows()).zip(y.iter()) {
            *loss = log_sum_exp(row) - row[*label];
        }

        Ok(loss.into_shape_with_order((steps, batch))?)
    }

    /// Computes the loss of every step and the gradients of their sum.
    ///
    /// # Arguments
    /// * `h` - The hidden states, `[steps, batch, units]`.
    /// * `y` - The label of every step, `[steps, batch]`.
    /// * `w_y` - The projection weights.
    /// * `b_y` - The projection biases.
    /// * `dw_y` - The buffer to write the weights' gradient to.
    /// * `db_y` - The buffer to write the biases' gradient to.
    ///
    /// # Returns
    /// The per step losses and the gradient to back-propagate into whatever produced `h`.
    pub fn forward_backward(
        &self,
        h: ArrayView3<f32>,
        y: ArrayView2<usize>,
        w_y: &[f32],
        b_y: &[f32],
        dw_y: &mut [f32],
        db_y: &mut [f32],
    ) -> Result<SoftmaxOutput> {
        let (steps, batch, units) = h.dim();
        let h2 = self.flatten(&h, y)?;
        let mut dlogits = self.logits(&h2.view(), w_y, b_y)?;
        let mut loss = Array1::zeros(steps * batch);

        for ((mut row, label), loss) in dlogits.rows_mut().into_iter().zip(y.iter()).zip(&mut loss) {
            let lse = log_sum_exp(row.view());
            *loss = lse - row[*label];

            row.mapv_inplace(|logit| (logit - lse).exp());
            row[*label] -= 1.;
        }

        let (w_size, b_size) = self.sizes();
        check("projection weights gradient", dw_y.len(), w_size)?;
        check("projection biases gradient", db_y.len(), b_size)?;

        let mut dw = ArrayViewMut2::from_shape((self.classes, units), dw_y)?;
        linalg::general_mat_mul(1., &dlogits.t(), &h2, 0., &mut dw);

        let mut db = ArrayViewMut1::from_shape(self.classes, db_y)?;
        db.assign(&dlogits.sum_axis(Axis(0)));

        let w = ArrayView2::from_shape((self.classes, units), w_y)?;
        let mut h_grad = Array2::zeros((steps * batch, units));
        linalg::general_mat_mul(1., &dlogits, &w, 0., &mut h_grad);

        Ok(SoftmaxOutput {
            loss: loss.into_shape_with_order((steps, batch))?,
            h_grad: h_grad.into_shape_with_order((steps, batch, units))?,
        })
    }

    /// Checks the hidden states and labels, flattening the former to `[steps * batch, units]`.
    fn flatten<'h>(
        &self,
        h: &'h ArrayView3<f32>,
        y: ArrayView2<usize>,
    ) -> Result<CowArray<'h, f32, Ix2>> {
        let (steps, batch, units) = h.dim();

        check("hidden state width", units, self.units)?;
        if y.dim() != (steps, batch) {
            return Err(MlErr::SizeMismatch {
                what: "labels",
                got: y.len(),
                expected: steps * batch,
            });
        }

        if let Some(&label) = y.iter().find(|&&label| label >= self.classes) {
            return Err(MlErr::LabelOutOfRange {
                label,
                classes: self.classes,
            });
        }

        Ok(h.to_shape((steps * batch, units))?)
    }

    /// Projects the flattened hidden states onto the classes.
    fn logits(&self, h2: &ArrayView2<f32>, w_y: &[f32], b_y: &[f32]) -> Result<Array2<f32>> {
        let (w_size, b_size) = self.sizes();
        check("projection weights", w_y.len(), w_size)?;
        check("projection biases", b_y.len(), b_size)?;

        let w = ArrayView2::from_shape((self.classes, self.units), w_y)?;
        let b = ArrayView1::from_shape(self.classes, b_y)?;

        let mut logits = Array2::zeros((h2.nrows(), self.classes));
        logits.assign(&b);
        linalg::general_mat_mul(1., h2, &w.t(), 1., &mut logits);

        Ok(logits)
    }
}

/// Sums the per step losses into the single value that gets logged.
pub fn total_loss(loss: &Array2<f32>) -> f32 {
    loss.sum()
}

fn log_sum_exp(row: ArrayView1<f32>) -> f32 {
    let max = row.fold(f32::NEG_INFINITY, |acc, &x| acc.max(x));
    max + row.iter().map(|&x| (x - max).exp()).sum::<f32>().ln()
}

fn check(what: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(MlErr::SizeMismatch {
            what,
            got,
            expected,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASSES: usize = 4;
    const UNITS: usize = 3;

    fn weights() -> (Vec<f32>, Vec<f32>) {
        let w_y = (0..CLASSES * UNITS)
            .map(|i| ((i * 5 % 7) as f32 - 3.) * 0.2)
            .collect();
        let b_y = vec![0.1, -0.2, 0.0, 0.3];
        (w_y, b_y)
    }

    fn hidden() -> Array3<f32> {
        Array3::from_shape_fn((2, 3, UNITS), |(t, b, j)| ((t + b * 2 + j) % 5) as f32 * 0.3 - 0.6)
    }

    fn labels() -> Array2<usize> {
        Array2::from_shape_fn((2, 3), |(t, b)| (t * 3 + b) % CLASSES)
    }

    #[test]
    fn uniform_logits_cost_log_classes() {
        let loss_fn = SoftmaxLoss::new(CLASSES, UNITS);
        let w_y = vec![0.; CLASSES * UNITS];
        let b_y = vec![0.; CLASSES];

        let loss = loss_fn
            .forward(hidden().view(), labels().view(), &w_y, &b_y)
            .unwrap();

        let expected = (CLASSES as f32).ln();
        assert!(loss.iter().all(|&l| (l - expected).abs() < 1e-6));
        assert!((total_loss(&loss) - 6. * expected).abs() < 1e-5);
    }

    #[test]
    fn forward_agrees_with_forward_backward() {
        let loss_fn = SoftmaxLoss::new(CLASSES, UNITS);
        let (w_y, b_y) = weights();
        let mut dw_y = vec![0.; CLASSES * UNITS];
        let mut db_y = vec![0.; CLASSES];

        let loss = loss_fn
            .forward(hidden().view(), labels().view(), &w_y, &b_y)
            .unwrap();
        let out = loss_fn
            .forward_backward(hidden().view(), labels().view(), &w_y, &b_y, &mut dw_y, &mut db_y)
            .unwrap();

        assert_eq!(loss, out.loss);
        assert_eq!(out.h_grad.dim(), (2, 3, UNITS));
        // Every row of `p - onehot(y)` sums to zero.
        assert!(db_y.iter().sum::<f32>().abs() < 1e-5);
    }

    #[test]
    fn gradients_match_finite_differences() {
        const EPS: f32 = 1e-2;

        let loss_fn = SoftmaxLoss::new(CLASSES, UNITS);
        let (mut w_y, mut b_y) = weights();
        let mut h = hidden();
        let y = labels();
        let mut dw_y = vec![0.; CLASSES * UNITS];
        let mut db_y = vec![0.; CLASSES];

        let out = loss_fn
            .forward_backward(h.view(), y.view(), &w_y, &b_y, &mut dw_y, &mut db_y)
            .unwrap();

        let sum = |h: &Array3<f32>, w_y: &[f32], b_y: &[f32]| {
            total_loss(&loss_fn.forward(h.view(), y.view(), w_y, b_y).unwrap())
        };
        let close = |analytic: f32, numeric: f32| (analytic - numeric).abs() < 2e-3 + 1e-2 * numeric.abs();

        for k in 0..w_y.len() {
            let orig = w_y[k];
            w_y[k] = orig + EPS;
            let plus = sum(&h, &w_y, &b_y);
            w_y[k] = orig - EPS;
            let minus = sum(&h, &w_y, &b_y);
            w_y[k] = orig;

            let numeric = (plus - minus) / (2. * EPS);
            assert!(close(dw_y[k], numeric), "w_y[{k}]: {} vs {numeric}", dw_y[k]);
        }

        for k in 0..b_y.len() {
            let orig = b_y[k];
            b_y[k] = orig + EPS;
            let plus = sum(&h, &w_y, &b_y);
            b_y[k] = orig - EPS;
            let minus = sum(&h, &w_y, &b_y);
            b_y[k] = orig;

            let numeric = (plus - minus) / (2. * EPS);
            assert!(close(db_y[k], numeric), "b_y[{k}]: {} vs {numeric}", db_y[k]);
        }

        for idx in [(0, 0, 0), (0, 2, 1), (1, 1, 2), (1, 2, 0)] {
            let orig = h[idx];
            h[idx] = orig + EPS;
            let plus = sum(&h, &w_y, &b_y);
            h[idx] = orig - EPS;
            let minus = sum(&h, &w_y, &b_y);
            h[idx] = orig;

            let numeric = (plus - minus) / (2. * EPS);
            assert!(close(out.h_grad[idx], numeric), "h{idx:?}: {} vs {numeric}", out.h_grad[idx]);
        }
    }

    #[test]
    fn label_out_of_range() {
        let loss_fn = SoftmaxLoss::new(CLASSES, UNITS);
        let (w_y, b_y) = weights();
        let mut y = labels();
        y[[1, 0]] = CLASSES;

        assert!(matches!(
            loss_fn.forward(hidden().view(), y.view(), &w_y, &b_y),
            Err(MlErr::LabelOutOfRange { label: CLASSES, classes: CLASSES })
        ));
    }

    #[test]
    fn wrong_projection_size() {
        let loss_fn = SoftmaxLoss::new(CLASSES, UNITS);
        let (w_y, b_y) = weights();

        assert!(matches!(
            loss_fn.forward(hidden().view(), labels().view(), &w_y[1..], &b_y),
            Err(MlErr::SizeMismatch { what: "projection weights", .. })
        ));
    }
}
