use ndarray::{Axis, IntoDimension, linalg, prelude::*};

use crate::{
    MlErr, Result,
    arch::params::GATES,
};

/// The output of a forward pass through a single `LstmLayer`.
#[derive(Debug, Clone)]
pub struct LayerOutput {
    /// `[steps, batch, units]`
    pub output: Array3<f32>,
    /// `[batch, units]`
    pub h_n: Array2<f32>,
    /// `[batch, units]`
    pub c_n: Array2<f32>,
}

/// The gradients a backward pass through a single `LstmLayer` hands to whatever feeds it.
#[derive(Debug, Clone)]
pub struct LayerGrads {
    /// `[steps, batch, input]`
    pub d_input: Array3<f32>,
    /// `[batch, units]`
    pub dh0: Array2<f32>,
    /// `[batch, units]`
    pub dc0: Array2<f32>,
}

/// Everything the backward pass needs from the forward pass.
#[derive(Debug, Clone)]
struct Reserve {
    x: Array3<f32>,
    /// Post activation gates `i | f | g | o`, `[steps, batch, 4 * units]`.
    gates: Array3<f32>,
    /// Hidden states including the initial one, `[steps + 1, batch, units]`.
    h: Array3<f32>,
    /// Cell states including the initial one, `[steps + 1, batch, units]`.
    c: Array3<f32>,
}

/// A single unidirectional LSTM layer unrolled over time.
///
/// The layer doesn't own its parameters, it views the raw slice it's given on each pass following
/// the layout described in `arch::params`.
#[derive(Debug, Clone)]
pub struct LstmLayer {
    input: usize,
    units: usize,
    size: usize,
    reserve: Option<Reserve>,
}

impl LstmLayer {
    /// Creates a new `LstmLayer`.
    ///
    /// # Arguments
    /// * `input` - The width of the input at every time step.
    /// * `units` - The width of the hidden and cell states.
    pub fn new(input: usize, units: usize) -> Self {
        Self {
            input,
            units,
            size: GATES * units * (input + units) + 2 * GATES * units,
            reserve: None,
        }
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Unrolls the layer over the whole input sequence.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters.
    /// * `x` - The input, `[steps, batch, input]`.
    /// * `h0` - The initial hidden state, `[batch, units]`.
    /// * `c0` - The initial cell state, `[batch, units]`.
    ///
    /// # Returns
    /// The hidden state at every step and the final states, or an error if any of the shapes
    /// doesn't match this layer.
    pub fn forward(
        &mut self,
        params: &[f32],
        x: ArrayView3<f32>,
        h0: ArrayView2<f32>,
        c0: ArrayView2<f32>,
    ) -> Result<LayerOutput> {
        let (steps, batch, input) = x.dim();
        let units = self.units;

        check("layer input", input, self.input)?;
        check_dim("initial hidden state", h0.dim(), (batch, units))?;
        check_dim("initial cell state", c0.dim(), (batch, units))?;

        let (w, r, b_w, b_r) = self.view_params(params)?;
        let mut bias = b_w.to_owned();
        bias.scaled_add(1., &b_r);

        let mut gates = Array3::zeros((steps, batch, GATES * units));
        let mut h = Array3::zeros((steps + 1, batch, units));
        let mut c = Array3::zeros((steps + 1, batch, units));
        h.index_axis_mut(Axis(0), 0).assign(&h0);
        c.index_axis_mut(Axis(0), 0).assign(&c0);

        let mut z = Array2::zeros((batch, GATES * units));

        for t in 0..steps {
            z.assign(&bias);
            linalg::general_mat_mul(1., &x.index_axis(Axis(0), t), &w, 1., &mut z);
            linalg::general_mat_mul(1., &h.index_axis(Axis(0), t), &r, 1., &mut z);

            let mut g = gates.index_axis_mut(Axis(0), t);

            for b in 0..batch {
                for j in 0..units {
                    let i = sigmoid(z[[b, j]]);
                    let f = sigmoid(z[[b, units + j]]);
                    let gg = z[[b, 2 * units + j]].tanh();
                    let o = sigmoid(z[[b, 3 * units + j]]);

                    g[[b, j]] = i;
                    g[[b, units + j]] = f;
                    g[[b, 2 * units + j]] = gg;
                    g[[b, 3 * units + j]] = o;

                    let c_t = f * c[[t, b, j]] + i * gg;
                    c[[t + 1, b, j]] = c_t;
                    h[[t + 1, b, j]] = o * c_t.tanh();
                }
            }
        }

        let out = LayerOutput {
            output: h.slice(s![1.., .., ..]).to_owned(),
            h_n: h.index_axis(Axis(0), steps).to_owned(),
            c_n: c.index_axis(Axis(0), steps).to_owned(),
        };

        self.reserve = Some(Reserve {
            x: x.to_owned(),
            gates,
            h,
            c,
        });

        Ok(out)
    }

    /// Back-propagates through time the gradients of the last forward pass.
    ///
    /// Consumes the state saved by `forward`, so every backward pass needs its own forward pass.
    ///
    /// # Arguments
    /// * `params` - This layer's parameters, the same ones used in the forward pass.
    /// * `grad` - The buffer to write this layer's parameter gradients to.
    /// * `d_output` - The gradient with respect to every step's output, `[steps, batch, units]`.
    /// * `dh_n` - The gradient with respect to the final hidden state, `[batch, units]`.
    /// * `dc_n` - The gradient with respect to the final cell state, `[batch, units]`.
    ///
    /// # Returns
    /// The gradients with respect to the input and the initial states.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d_output: ArrayView3<f32>,
        dh_n: ArrayView2<f32>,
        dc_n: ArrayView2<f32>,
    ) -> Result<LayerGrads> {
        let Reserve { x, gates, h, c } = self.reserve.take().ok_or(MlErr::MissingForward)?;
        let (steps, batch, _) = gates.dim();
        let units = self.units;

        check_dim("output gradient", d_output.dim(), (steps, batch, units))?;
        check_dim("final hidden state gradient", dh_n.dim(), (batch, units))?;
        check_dim("final cell state gradient", dc_n.dim(), (batch, units))?;
        check("gradient", grad.len(), self.size)?;

        let (w, r, _, _) = self.view_params(params)?;
        grad.fill(0.);
        let (mut dw, mut dr, mut db_w, mut db_r) = self.view_grad(grad)?;

        let mut dh_next = dh_n.to_owned();
        let mut dc_next = dc_n.to_owned();
        let mut dz = Array2::zeros((batch, GATES * units));
        let mut d_input = Array3::zeros((steps, batch, self.input));

        for t in (0..steps).rev() {
            let g = gates.index_axis(Axis(0), t);

            for b in 0..batch {
                for j in 0..units {
                    let i = g[[b, j]];
                    let f = g[[b, units + j]];
                    let gg = g[[b, 2 * units + j]];
                    let o = g[[b, 3 * units + j]];

                    let tanh_c = c[[t + 1, b, j]].tanh();
                    let dh = d_output[[t, b, j]] + dh_next[[b, j]];
                    let dc = dc_next[[b, j]] + dh * o * (1. - tanh_c * tanh_c);

                    dz[[b, j]] = dc * gg * i * (1. - i);
                    dz[[b, units + j]] = dc * c[[t, b, j]] * f * (1. - f);
                    dz[[b, 2 * units + j]] = dc * i * (1. - gg * gg);
                    dz[[b, 3 * units + j]] = dh * tanh_c * o * (1. - o);

                    dc_next[[b, j]] = dc * f;
                }
            }

            let x_t = x.index_axis(Axis(0), t).reversed_axes();
            let h_prev = h.index_axis(Axis(0), t).reversed_axes();
            linalg::general_mat_mul(1., &x_t, &dz, 1., &mut dw);
            linalg::general_mat_mul(1., &h_prev, &dz, 1., &mut dr);

            let db = dz.sum_axis(Axis(0));
            db_w.scaled_add(1., &db);
            db_r.scaled_add(1., &db);

            let mut dx_t = d_input.index_axis_mut(Axis(0), t);
            linalg::general_mat_mul(1., &dz, &w.t(), 0., &mut dx_t);
            linalg::general_mat_mul(1., &dz, &r.t(), 0., &mut dh_next);
        }

        Ok(LayerGrads {
            d_input,
            dh0: dh_next,
            dc0: dc_next,
        })
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    ///
    /// # Returns
    /// A tuple containing the input weights, recurrent weights, input biases and recurrent biases.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(
        ArrayView2<'a, f32>,
        ArrayView2<'a, f32>,
        ArrayView1<'a, f32>,
        ArrayView1<'a, f32>,
    )> {
        check("layer parameters", params.len(), self.size)?;

        let gw = GATES * self.units;
        let (w, rest) = params.split_at(self.input * gw);
        let (r, rest) = rest.split_at(self.units * gw);
        let (b_w, b_r) = rest.split_at(gw);

        Ok((
            ArrayView2::from_shape((self.input, gw), w)?,
            ArrayView2::from_shape((self.units, gw), r)?,
            ArrayView1::from_shape(gw, b_w)?,
            ArrayView1::from_shape(gw, b_r)?,
        ))
    }

    /// Gives a view of the raw gradient slice with the same layout as `view_params`.
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> Result<(
        ArrayViewMut2<'a, f32>,
        ArrayViewMut2<'a, f32>,
        ArrayViewMut1<'a, f32>,
        ArrayViewMut1<'a, f32>,
    )> {
        let gw = GATES * self.units;
        let (dw, rest) = grad.split_at_mut(self.input * gw);
        let (dr, rest) = rest.split_at_mut(self.units * gw);
        let (db_w, db_r) = rest.split_at_mut(gw);

        Ok((
            ArrayViewMut2::from_shape((self.input, gw), dw)?,
            ArrayViewMut2::from_shape((self.units, gw), dr)?,
            ArrayViewMut1::from_shape(gw, db_w)?,
            ArrayViewMut1::from_shape(gw, db_r)?,
        ))
    }
}

fn sigmoid(z: f32) -> f32 {
    1. / (1. + (-z).exp())
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

/// Checks a whole shape, reporting the element counts on mismatch.
fn check_dim<D>(what: &'static str, got: D, expected: D) -> Result<()>
where
    D: IntoDimension + PartialEq,
{
    if got != expected {
        return Err(MlErr::SizeMismatch {
            what,
            got: got.into_dimension().size(),
            expected: expected.into_dimension().size(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: usize = 3;
    const UNITS: usize = 2;
    const STEPS: usize = 4;
    const BATCH: usize = 2;

    fn params(size: usize) -> Vec<f32> {
        (0..size).map(|i| ((i * 7 % 13) as f32 - 6.) * 0.08).collect()
    }

    fn input() -> Array3<f32> {
        Array3::from_shape_fn((STEPS, BATCH, INPUT), |(t, b, i)| {
            ((t * 5 + b * 3 + i) % 7) as f32 * 0.2 - 0.6
        })
    }

    fn states() -> (Array2<f32>, Array2<f32>) {
        let h0 = Array2::from_shape_fn((BATCH, UNITS), |(b, j)| 0.1 * (b + j) as f32 - 0.05);
        let c0 = Array2::from_shape_fn((BATCH, UNITS), |(b, j)| 0.2 - 0.15 * (b * j) as f32);
        (h0, c0)
    }

    /// A scalar function of every output so that all of them take part in the gradient check.
    fn objective(out: &LayerOutput, proj: &Array3<f32>) -> f32 {
        (&out.output * proj).sum() + out.h_n.sum() * 0.5 - out.c_n.sum() * 0.3
    }

    fn projection() -> Array3<f32> {
        Array3::from_shape_fn((STEPS, BATCH, UNITS), |(t, b, j)| {
            ((t + 2 * b + 3 * j) % 5) as f32 * 0.25 - 0.5
        })
    }

    fn run(layer: &mut LstmLayer, params: &[f32], x: &Array3<f32>) -> f32 {
        let (h0, c0) = states();
        run_from(layer, params, x, &h0, &c0)
    }

    fn run_from(
        layer: &mut LstmLayer,
        params: &[f32],
        x: &Array3<f32>,
        h0: &Array2<f32>,
        c0: &Array2<f32>,
    ) -> f32 {
        let out = layer
            .forward(params, x.view(), h0.view(), c0.view())
            .unwrap();
        objective(&out, &projection())
    }

    #[test]
    fn zero_params_keep_zero_state() {
        let mut layer = LstmLayer::new(INPUT, UNITS);
        let params = vec![0.; layer.size()];
        let zeros = Array2::zeros((BATCH, UNITS));

        let out = layer
            .forward(&params, input().view(), zeros.view(), zeros.view())
            .unwrap();

        // With every preactivation at zero: i = f = o = 0.5 and g = 0.
        assert!(out.output.iter().all(|&h| h == 0.));
        assert!(out.c_n.iter().all(|&c| c == 0.));
    }

    #[test]
    fn single_step_matches_the_cell_equations() {
        let mut layer = LstmLayer::new(1, 1);
        // W = [wi, wf, wg, wo], R = [ri, rf, rg, ro], b_w, b_r.
        let params = [0.5, -0.3, 0.8, 0.1, 0.2, 0.4, -0.6, 0.7, 0.1, 0.0, 0.0, -0.2, 0.05, 0.0, 0.1, 0.0];
        assert_eq!(params.len(), layer.size());

        let x = Array3::from_elem((1, 1, 1), 2.);
        let h0 = Array2::from_elem((1, 1), 0.5);
        let c0 = Array2::from_elem((1, 1), -1.);
        let out = layer.forward(&params, x.view(), h0.view(), c0.view()).unwrap();

        let i = sigmoid(0.5 * 2. + 0.2 * 0.5 + 0.1 + 0.05);
        let f = sigmoid(-0.3 * 2. + 0.4 * 0.5);
        let g = (0.8 * 2. - 0.6 * 0.5 + 0.1_f32).tanh();
        let o = sigmoid(0.1 * 2. + 0.7 * 0.5 - 0.2);
        let c = f * -1. + i * g;
        let h = o * c.tanh();

        assert!((out.c_n[[0, 0]] - c).abs() < 1e-6);
        assert!((out.h_n[[0, 0]] - h).abs() < 1e-6);
        assert_eq!(out.output[[0, 0, 0]], out.h_n[[0, 0]]);
    }

    #[test]
    fn wrong_shapes() {
        let mut layer = LstmLayer::new(INPUT, UNITS);
        let params = vec![0.; layer.size()];
        let (h0, c0) = states();

        let x = Array3::zeros((STEPS, BATCH, INPUT + 1));
        assert!(matches!(
            layer.forward(&params, x.view(), h0.view(), c0.view()),
            Err(MlErr::SizeMismatch { what: "layer input", .. })
        ));

        assert!(matches!(
            layer.forward(&params[1..], input().view(), h0.view(), c0.view()),
            Err(MlErr::SizeMismatch { what: "layer parameters", .. })
        ));
    }

    #[test]
    fn backward_needs_forward() {
        let mut layer = LstmLayer::new(INPUT, UNITS);
        let params = vec![0.; layer.size()];
        let mut grad = vec![0.; layer.size()];
        let d = Array3::zeros((STEPS, BATCH, UNITS));
        let dh = Array2::zeros((BATCH, UNITS));

        assert!(matches!(
            layer.backward(&params, &mut grad, d.view(), dh.view(), dh.view()),
            Err(MlErr::MissingForward)
        ));
    }

    #[test]
    fn gradients_match_finite_differences() {
        const EPS: f32 = 1e-2;

        let mut layer = LstmLayer::new(INPUT, UNITS);
        let mut params = params(layer.size());
        let x = input();
        let (h0, c0) = states();

        layer
            .forward(&params, x.view(), h0.view(), c0.view())
            .unwrap();

        let d_output = projection();
        let dh_n = Array2::from_elem((BATCH, UNITS), 0.5);
        let dc_n = Array2::from_elem((BATCH, UNITS), -0.3);
        let mut grad = vec![0.; layer.size()];
        let grads = layer
            .backward(&params, &mut grad, d_output.view(), dh_n.view(), dc_n.view())
            .unwrap();

        for k in 0..params.len() {
            let orig = params[k];
            params[k] = orig + EPS;
            let plus = run(&mut layer, &params, &x);
            params[k] = orig - EPS;
            let minus = run(&mut layer, &params, &x);
            params[k] = orig;

            let numeric = (plus - minus) / (2. * EPS);
            assert!(
                (numeric - grad[k]).abs() < 2e-3 + 2e-2 * numeric.abs(),
                "param {k}: numeric {numeric}, analytic {}",
                grad[k]
            );
        }

        let mut x_mut = x.clone();
        for idx in [(0, 0, 0), (1, 1, 2), (3, 0, 1), (2, 1, 0)] {
            let orig = x_mut[idx];
            x_mut[idx] = orig + EPS;
            let plus = run(&mut layer, &params, &x_mut);
            x_mut[idx] = orig - EPS;
            let minus = run(&mut layer, &params, &x_mut);
            x_mut[idx] = orig;

            let numeric = (plus - minus) / (2. * EPS);
            let analytic = grads.d_input[idx];
            assert!(
                (numeric - analytic).abs() < 2e-3 + 2e-2 * numeric.abs(),
                "input {idx:?}: numeric {numeric}, analytic {analytic}"
            );
        }

        for idx in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            let (mut h0, mut c0) = states();

            let orig = h0[idx];
            h0[idx] = orig + EPS;
            let plus = run_from(&mut layer, &params, &x, &h0, &c0);
            h0[idx] = orig - EPS;
            let minus = run_from(&mut layer, &params, &x, &h0, &c0);
            h0[idx] = orig;

            let numeric = (plus - minus) / (2. * EPS);
            let analytic = grads.dh0[idx];
            assert!(
                (numeric - analytic).abs() < 2e-3 + 2e-2 * numeric.abs(),
                "h0 {idx:?}: numeric {numeric}, analytic {analytic}"
            );

            let orig = c0[idx];
            c0[idx] = orig + EPS;
            let plus = run_from(&mut layer, &params, &x, &h0, &c0);
            c0[idx] = orig - EPS;
            let minus = run_from(&mut layer, &params, &x, &h0, &c0);
            c0[idx] = orig;

            let numeric = (plus - minus) / (2. * EPS);
            let analytic = grads.dc0[idx];
            assert!(
                (numeric - analytic).abs() < 2e-3 + 2e-2 * numeric.abs(),
                "c0 {idx:?}: numeric {numeric}, analytic {analytic}"
            );
        }
    }
}
