//! Layout of the LSTM parameters.
//!
//! Every layer is stored as one contiguous block of the flat parameter buffer:
//!
//! * `W   [layer_input, 4 * units]` - input weights, gate blocks `i | f | g | o` as columns.
//! * `R   [units, 4 * units]`       - recurrent weights, same gate blocks.
//! * `b_w [4 * units]`              - input biases.
//! * `b_r [4 * units]`              - recurrent biases.
//!
//! The *canonical* form keeps every gate's matrix and bias as its own buffer: per layer 4 input
//! matrices `[layer_input, units]`, 4 recurrent matrices `[units, units]` and 8 biases `[units]`.

use std::mem;

use crate::{MlErr, Result};

/// The amount of gates of an LSTM cell.
pub const GATES: usize = 4;

/// The amount of canonical weight matrices (and bias vectors) per layer.
pub const CANONICAL_PER_LAYER: usize = 2 * GATES;

/// The static dimensions of a unidirectional, stacked LSTM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LstmShape {
    pub num_layers: usize,
    pub num_units: usize,
    pub input_size: usize,
}

impl LstmShape {
    pub fn new(num_layers: usize, num_units: usize, input_size: usize) -> Self {
        Self {
            num_layers,
            num_units,
            input_size,
        }
    }

    /// Returns the width of the input the given layer receives.
    pub fn layer_input(&self, layer: usize) -> usize {
        if layer == 0 {
            self.input_size
        } else {
            self.num_units
        }
    }

    /// Returns the amount of parameters of the given layer.
    pub fn layer_size(&self, layer: usize) -> usize {
        let (input, units) = (self.layer_input(layer), self.num_units);
        GATES * units * (input + units) + 2 * GATES * units
    }

    /// Returns the amount of parameters of every layer, bottom to top.
    pub fn layer_sizes(&self) -> Vec<usize> {
        (0..self.num_layers).map(|l| self.layer_size(l)).collect()
    }
}

/// Returns the length of the flat parameter buffer of an LSTM with the given shape.
pub fn params_size(shape: &LstmShape) -> usize {
    shape.layer_sizes().iter().sum()
}

/// Packs the canonical weights and biases into a flat parameter buffer.
///
/// # Arguments
/// * `shape` - The shape of the LSTM.
/// * `weights` - Per layer, the 4 input weight matrices followed by the 4 recurrent ones.
/// * `biases` - Per layer, the 4 input biases followed by the 4 recurrent ones.
///
/// # Returns
/// The flat parameter buffer or an error if any of the given buffers has the wrong size.
pub fn canonical_to_params<W, B>(shape: &LstmShape, weights: &[W], biases: &[B]) -> Result<Vec<f32>>
where
    W: AsRef<[f32]>,
    B: AsRef<[f32]>,
{
    let expected = CANONICAL_PER_LAYER * shape.num_layers;
    check("canonical weights", weights.len(), expected)?;
    check("canonical biases", biases.len(), expected)?;

    let units = shape.num_units;
    let mut params = vec![0.; params_size(shape)];
    let mut rest = params.as_mut_slice();

    for layer in 0..shape.num_layers {
        let input = shape.layer_input(layer);
        let block;
        (block, rest) = mem::take(&mut rest).split_at_mut(shape.layer_size(layer));

        let weights = &weights[layer * CANONICAL_PER_LAYER..(layer + 1) * CANONICAL_PER_LAYER];
        let biases = &biases[layer * CANONICAL_PER_LAYER..(layer + 1) * CANONICAL_PER_LAYER];

        let (w, tail) = block.split_at_mut(GATES * input * units);
        let (r, tail) = tail.split_at_mut(GATES * units * units);
        let (b_w, b_r) = tail.split_at_mut(GATES * units);

        for gate in 0..GATES {
            pack_matrix(w, input, units, gate, weights[gate].as_ref())?;
            pack_matrix(r, units, units, gate, weights[GATES + gate].as_ref())?;
            pack_vector(b_w, units, gate, biases[gate].as_ref())?;
            pack_vector(b_r, units, gate, biases[GATES + gate].as_ref())?;
        }
    }

    Ok(params)
}

/// Unpacks a flat parameter buffer into its canonical weights and biases.
///
/// # Arguments
/// * `shape` - The shape of the LSTM.
/// * `params` - The flat parameter buffer.
///
/// # Returns
/// A tuple of the canonical weights and biases in the order `canonical_to_params` expects them.
pub fn params_to_canonical(
    shape: &LstmShape,
    params: &[f32],
) -> Result<(Vec<Vec<f32>>, Vec<Vec<f32>>)> {
    check("parameters", params.len(), params_size(shape))?;

    let units = shape.num_units;
    let mut weights = Vec::with_capacity(CANONICAL_PER_LAYER * shape.num_layers);
    let mut biases = Vec::with_capacity(CANONICAL_PER_LAYER * shape.num_layers);
    let mut rest = params;

    for layer in 0..shape.num_layers {
        let input = shape.layer_input(layer);
        let block;
        (block, rest) = rest.split_at(shape.layer_size(layer));

        let (w, tail) = block.split_at(GATES * input * units);
        let (r, tail) = tail.split_at(GATES * units * units);
        let (b_w, b_r) = tail.split_at(GATES * units);

        weights.extend((0..GATES).map(|gate| unpack_matrix(w, input, units, gate)));
        weights.extend((0..GATES).map(|gate| unpack_matrix(r, units, units, gate)));
        biases.extend((0..GATES).map(|gate| b_w[gate * units..(gate + 1) * units].to_vec()));
        biases.extend((0..GATES).map(|gate| b_r[gate * units..(gate + 1) * units].to_vec()));
    }

    Ok((weights, biases))
}

fn pack_matrix(dst: &mut [f32], rows: usize, units: usize, gate: usize, src: &[f32]) -> Result<()> {
    check("canonical weight matrix", src.len(), rows * units)?;

    for (row, values) in src.chunks_exact(units).enumerate() {
        let start = row * GATES * units + gate * units;
        dst[start..start + units].copy_from_slice(values);
    }

    Ok(())
}

fn pack_vector(dst: &mut [f32], units: usize, gate: usize, src: &[f32]) -> Result<()> {
    check("canonical bias", src.len(), units)?;
    dst[gate * units..(gate + 1) * units].copy_from_slice(src);
    Ok(())
}

fn unpack_matrix(src: &[f32], rows: usize, units: usize, gate: usize) -> Vec<f32> {
    (0..rows)
        .flat_map(|row| {
            let start = row * GATES * units + gate * units;
            src[start..start + units].iter().copied()
        })
        .collect()
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
