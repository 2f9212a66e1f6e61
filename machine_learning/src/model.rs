use ndarray::prelude::*;
use rayon::prelude::*;

use crate::{
    MlErr, Result,
    arch::{
        Lstm, LstmShape,
        loss::{SoftmaxLoss, total_loss},
        params::{self, CANONICAL_PER_LAYER, GATES},
    },
    initialization::ParamGen,
    optimization::Optimizer,
};

/// A named buffer of parameters together with its gradient.
#[derive(Debug, Clone)]
pub struct ParamGroup {
    name: &'static str,
    params: Box<[f32]>,
    grad: Box<[f32]>,
}

impl ParamGroup {
    fn new(name: &'static str, params: Vec<f32>) -> Self {
        let grad = vec![0.; params.len()].into_boxed_slice();

        Self {
            name,
            params: params.into_boxed_slice(),
            grad,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn grad(&self) -> &[f32] {
        &self.grad
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// The result of a single training step.
#[derive(Debug, Clone)]
pub struct StepOutput {
    /// The cross entropy of every step, `[steps, batch]`.
    pub loss: Array2<f32>,
    /// `[layers, batch, units]`
    pub h_n: Array3<f32>,
    /// `[layers, batch, units]`
    pub c_n: Array3<f32>,
}

impl StepOutput {
    /// Returns the sum of the losses of every step and sequence.
    pub fn total_loss(&self) -> f32 {
        total_loss(&self.loss)
    }
}

/// The melody prediction network: a stacked LSTM followed by a softmax projection onto the event
/// classes.
///
/// Its parameters are split in three groups, each one updated by its own optimizer:
/// the flat LSTM buffer, the projection weights `w_y` and the projection biases `b_y`.
#[derive(Debug, Clone)]
pub struct MelodyRnn {
    lstm: Lstm,
    loss_fn: SoftmaxLoss,
    groups: [ParamGroup; Self::GROUPS],
}

impl MelodyRnn {
    /// The amount of parameter groups, and so of optimizers, of the model.
    pub const GROUPS: usize = 3;

    /// Creates a new `MelodyRnn`, the amount of event classes being the input size.
    ///
    /// The generator is sampled in this order: per layer the 8 canonical weight matrices and the 8
    /// canonical biases, then `w_y` and finally `b_y`.
    ///
    /// # Arguments
    /// * `shape` - The dimensions of the LSTM.
    /// * `param_gen` - The generator of the initial parameters.
    ///
    /// # Returns
    /// A new `MelodyRnn` or an error if the generator ran out.
    pub fn new<G: ParamGen + ?Sized>(shape: LstmShape, param_gen: &mut G) -> Result<Self> {
        let units = shape.num_units;
        let mut weights = Vec::with_capacity(CANONICAL_PER_LAYER * shape.num_layers);
        let mut biases = Vec::with_capacity(CANONICAL_PER_LAYER * shape.num_layers);

        for layer in 0..shape.num_layers {
            let input = shape.layer_input(layer);

            for _ in 0..GATES {
                weights.push(param_gen.sample_exact(input * units)?);
            }
            for _ in 0..GATES {
                weights.push(param_gen.sample_exact(units * units)?);
            }
            for _ in 0..CANONICAL_PER_LAYER {
                biases.push(param_gen.sample_exact(units)?);
            }
        }

        let lstm_params = params::canonical_to_params(&shape, &weights, &biases)?;
        let loss_fn = SoftmaxLoss::new(shape.input_size, units);
        let (w_size, b_size) = loss_fn.sizes();
        let w_y = param_gen.sample_exact(w_size)?;
        let b_y = param_gen.sample_exact(b_size)?;

        Ok(Self {
            lstm: Lstm::new(shape),
            loss_fn,
            groups: [
                ParamGroup::new("lstm", lstm_params),
                ParamGroup::new("w_y", w_y),
                ParamGroup::new("b_y", b_y),
            ],
        })
    }

    pub fn shape(&self) -> LstmShape {
        self.lstm.shape()
    }

    /// Returns the parameter groups in the order optimizers are matched against them.
    pub fn groups(&self) -> &[ParamGroup] {
        &self.groups
    }

    /// Returns the total amount of trainable parameters.
    pub fn num_params(&self) -> usize {
        self.groups.iter().map(ParamGroup::len).sum()
    }

    /// Unpacks the LSTM parameters into their canonical weights and biases.
    pub fn canonical(&self) -> Result<(Vec<Vec<f32>>, Vec<Vec<f32>>)> {
        params::params_to_canonical(&self.shape(), &self.groups[0].params)
    }

    /// Zeros out the gradients of every group.
    pub fn zero_grad(&mut self) {
        self.groups
            .par_iter_mut()
            .for_each(|group| group.grad.fill(0.));
    }

    /// Makes a full training step: forward pass, loss, back-propagation through the projection and
    /// through time, and one update of every parameter group.
    ///
    /// # Arguments
    /// * `x` - The inputs, `[steps, batch, input_size]`.
    /// * `y` - The label to predict at every step, `[steps, batch]`.
    /// * `h0` - The initial hidden states, `[layers, batch, units]`.
    /// * `c0` - The initial cell states, `[layers, batch, units]`.
    /// * `optimizers` - One optimizer per parameter group.
    ///
    /// # Returns
    /// The losses of the step and the final states, or an error if any of the shapes is wrong.
    pub fn train_step<O: Optimizer + Send>(
        &mut self,
        x: ArrayView3<f32>,
        y: ArrayView2<usize>,
        h0: ArrayView3<f32>,
        c0: ArrayView3<f32>,
        optimizers: &mut [O],
    ) -> Result<StepOutput> {
        if optimizers.len() != Self::GROUPS {
            return Err(MlErr::SizeMismatch {
                what: "optimizers",
                got: optimizers.len(),
                expected: Self::GROUPS,
            });
        }

        self.zero_grad();
        let [lstm, w_y, b_y] = &mut self.groups;

        let out = self.lstm.forward(&lstm.params, x, h0, c0)?;
        let softmax = self.loss_fn.forward_backward(
            out.output.view(),
            y,
            &w_y.params,
            &b_y.params,
            &mut w_y.grad,
            &mut b_y.grad,
        )?;

        // Nothing downstream depends on the final states.
        let zeros = Array3::zeros(out.h_n.raw_dim());
        self.lstm.backward(
            &lstm.params,
            &mut lstm.grad,
            softmax.h_grad.view(),
            zeros.view(),
            zeros.view(),
        )?;

        self.optimize(optimizers)?;

        Ok(StepOutput {
            loss: softmax.loss,
            h_n: out.h_n,
            c_n: out.c_n,
        })
    }

    /// Computes the loss of every step without touching the parameters.
    pub fn evaluate(
        &mut self,
        x: ArrayView3<f32>,
        y: ArrayView2<usize>,
        h0: ArrayView3<f32>,
        c0: ArrayView3<f32>,
    ) -> Result<Array2<f32>> {
        let [lstm, w_y, b_y] = &self.groups;
        let out = self.lstm.forward(&lstm.params, x, h0, c0)?;
        self.loss_fn
            .forward(out.output.view(), y, &w_y.params, &b_y.params)
    }

    /// Applies every group's gradient with its optimizer, in parallel.
    fn optimize<O: Optimizer + Send>(&mut self, optimizers: &mut [O]) -> Result<()> {
        optimizers
            .par_iter_mut()
            .zip(self.groups.par_iter_mut())
            .try_for_each(|(optimizer, group)| optimizer.update_params(&group.grad, &mut group.params))
    }
}
