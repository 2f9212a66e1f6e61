use std::mem;

use ndarray::{Axis, prelude::*};

use super::{
    layers::{LayerGrads, LstmLayer},
    params::LstmShape,
};
use crate::{MlErr, Result};

/// The output of a forward pass through the whole stack.
#[derive(Debug, Clone)]
pub struct LstmOutput {
    /// The hidden state of the top layer at every step, `[steps, batch, units]`.
    pub output: Array3<f32>,
    /// `[layers, batch, units]`
    pub h_n: Array3<f32>,
    /// `[layers, batch, units]`
    pub c_n: Array3<f32>,
}

/// The gradients with respect to the inputs of the stack.
#[derive(Debug, Clone)]
pub struct LstmGrads {
    /// `[steps, batch, input_size]`
    pub d_input: Array3<f32>,
    /// `[layers, batch, units]`
    pub dh0: Array3<f32>,
    /// `[layers, batch, units]`
    pub dc0: Array3<f32>,
}

/// A unidirectional stack of `LstmLayer`s over a single flat parameter buffer.
#[derive(Debug, Clone)]
pub struct Lstm {
    shape: LstmShape,
    layers: Vec<LstmLayer>,
}

impl Lstm {
    /// Creates a new `Lstm`.
    ///
    /// # Arguments
    /// * `shape` - The dimensions of the stack.
    pub fn new(shape: LstmShape) -> Self {
        let layers = (0..shape.num_layers)
            .map(|l| LstmLayer::new(shape.layer_input(l), shape.num_units))
            .collect();

        Self { shape, layers }
    }

    pub fn shape(&self) -> LstmShape {
        self.shape
    }

    /// Returns the length of the flat parameter buffer.
    pub fn size(&self) -> usize {
        self.layers.iter().map(LstmLayer::size).sum()
    }

    /// Makes a forward pass through every layer, bottom to top.
    ///
    /// # Arguments
    /// * `params` - The flat parameter buffer.
    /// * `x` - The input, `[steps, batch, input_size]`.
    /// * `h0` - The initial hidden state of every layer, `[layers, batch, units]`.
    /// * `c0` - The initial cell state of every layer, `[layers, batch, units]`.
    ///
    /// # Returns
    /// The top layer's output and every layer's final states.
    pub fn forward(
        &mut self,
        params: &[f32],
        x: ArrayView3<f32>,
        h0: ArrayView3<f32>,
        c0: ArrayView3<f32>,
    ) -> Result<LstmOutput> {
        let (_, batch, _) = x.dim();
        let (layers, units) = (self.shape.num_layers, self.shape.num_units);

        check("parameters", params.len(), self.size())?;
        check("initial hidden state", h0.len(), layers * batch * units)?;
        check("initial cell state", c0.len(), layers * batch * units)?;

        let mut h_n = Array3::zeros((layers, batch, units));
        let mut c_n = Array3::zeros((layers, batch, units));
        let mut output: Option<Array3<f32>> = None;
        let mut rest = params;

        for (l, layer) in self.layers.iter_mut().enumerate() {
            let chunk;
            (chunk, rest) = rest.split_at(layer.size());

            let input = output.as_ref().map_or(x.view(), |out| out.view());
            let out = layer.forward(
                chunk,
                input,
                h0.index_axis(Axis(0), l),
                c0.index_axis(Axis(0), l),
            )?;

            h_n.index_axis_mut(Axis(0), l).assign(&out.h_n);
            c_n.index_axis_mut(Axis(0), l).assign(&out.c_n);
            output = Some(out.output);
        }

        let output = output.ok_or(MlErr::SizeMismatch {
            what: "layers",
            got: 0,
            expected: 1,
        })?;

        Ok(LstmOutput { output, h_n, c_n })
    }

    /// Back-propagates through every layer, top to bottom.
    ///
    /// # Arguments
    /// * `params` - The flat parameter buffer used in the last forward pass.
    /// * `grad` - The flat gradient buffer, overwritten with this pass' gradients.
    /// * `d_output` - The gradient with respect to the top layer's output.
    /// * `dh_n` - The gradient with respect to every layer's final hidden state.
    /// * `dc_n` - The gradient with respect to every layer's final cell state.
    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d_output: ArrayView3<f32>,
        dh_n: ArrayView3<f32>,
        dc_n: ArrayView3<f32>,
    ) -> Result<LstmGrads> {
        let size = self.size();
        check("parameters", params.len(), size)?;
        check("gradient", grad.len(), size)?;
        check("final hidden state gradient", dh_n.dim().0, self.layers.len())?;
        check("final cell state gradient", dc_n.dim().0, self.layers.len())?;

        let mut dh0 = Array3::zeros(dh_n.raw_dim());
        let mut dc0 = Array3::zeros(dc_n.raw_dim());
        let mut d: Option<LayerGrads> = None;

        let mut params_rest = params;
        let mut grad_rest = grad;

        for (l, layer) in self.layers.iter_mut().enumerate().rev() {
            let (params_head, params_chunk) = params_rest.split_at(params_rest.len() - layer.size());
            let split = grad_rest.len() - layer.size();
            let (grad_head, grad_chunk) = mem::take(&mut grad_rest).split_at_mut(split);
            params_rest = params_head;
            grad_rest = grad_head;

            let d_out = d.as_ref().map_or(d_output, |prev| prev.d_input.view());
            let grads = layer.backward(
                params_chunk,
                grad_chunk,
                d_out,
                dh_n.index_axis(Axis(0), l),
                dc_n.index_axis(Axis(0), l),
            )?;

            dh0.index_axis_mut(Axis(0), l).assign(&grads.dh0);
            dc0.index_axis_mut(Axis(0), l).assign(&grads.dc0);
            d = Some(grads);
        }

        let d_input = d.map(|grads| grads.d_input).ok_or(MlErr::SizeMismatch {
            what: "layers",
            got: 0,
            expected: 1,
        })?;

        Ok(LstmGrads { d_input, dh0, dc0 })
    }
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
