use std::{error::Error, fmt, mem};

use ndarray::{Axis, prelude::*};
use records::MelodySequence;

/// A time major batch of melodies.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// `[time_len, batch_size, input_size]`
    pub x: Array3<f32>,
    /// The label of the following step, `[time_len, batch_size]`.
    pub y: Array2<usize>,
}

/// Why a melody can't be part of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchErr {
    TooShort {
        labels: usize,
        steps: usize,
        needed: usize,
    },
    WrongInputSize {
        got: usize,
        expected: usize,
    },
    LabelOutOfRange {
        step: usize,
        label: i64,
    },
    Full {
        batch_size: usize,
    },
}

impl fmt::Display for BatchErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchErr::TooShort {
                labels,
                steps,
                needed,
            } => write!(
                f,
                "sequence too short: {labels} labels and {steps} input steps, need {} and {needed}",
                needed + 1
            ),
            BatchErr::WrongInputSize { got, expected } => {
                write!(f, "input size mismatch: got {got}, expected {expected}")
            }
            BatchErr::LabelOutOfRange { step, label } => {
                write!(f, "label {label} at step {step} is not a valid event")
            }
            BatchErr::Full { batch_size } => {
                write!(f, "the batch already holds {batch_size} sequences")
            }
        }
    }
}

impl Error for BatchErr {}

/// Fills a batch one melody per column.
///
/// Every melody contributes its first `time_len` input steps and the labels shifted by one, so
/// the model learns to predict the next event. Longer melodies are truncated.
#[derive(Debug)]
pub struct Batcher {
    time_len: usize,
    batch_size: usize,
    input_size: usize,
    x: Array3<f32>,
    y: Array2<usize>,
    filled: usize,
}

impl Batcher {
    /// Creates a new `Batcher`.
    ///
    /// # Arguments
    /// * `time_len` - The amount of steps of every batch.
    /// * `batch_size` - The amount of melodies of every batch.
    /// * `input_size` - The width of every input step, also the amount of event classes.
    pub fn new(time_len: usize, batch_size: usize, input_size: usize) -> Self {
        Self {
            time_len,
            batch_size,
            input_size,
            x: Array3::zeros((time_len, batch_size, input_size)),
            y: Array2::zeros((time_len, batch_size)),
            filled: 0,
        }
    }

    /// Returns the amount of melodies accepted into the current batch.
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub fn is_full(&self) -> bool {
        self.filled == self.batch_size
    }

    /// Writes `sequence` into the next free column.
    ///
    /// # Returns
    /// An error without touching the batch if the melody can't be used, or if the batch is
    /// already full.
    pub fn accept(&mut self, sequence: &MelodySequence) -> Result<(), BatchErr> {
        if self.is_full() {
            return Err(BatchErr::Full {
                batch_size: self.batch_size,
            });
        }

        if sequence.input_size != self.input_size {
            return Err(BatchErr::WrongInputSize {
                got: sequence.input_size,
                expected: self.input_size,
            });
        }

        let (labels, steps) = (sequence.labels.len(), sequence.steps());
        if labels <= self.time_len || steps < self.time_len {
            return Err(BatchErr::TooShort {
                labels,
                steps,
                needed: self.time_len,
            });
        }

        let targets = &sequence.labels[1..=self.time_len];
        if let Some((step, &label)) = targets
            .iter()
            .enumerate()
            .find(|&(_, &label)| label < 0 || label as usize >= self.input_size)
        {
            return Err(BatchErr::LabelOutOfRange {
                step: step + 1,
                label,
            });
        }

        let b = self.filled;
        for t in 0..self.time_len {
            self.x
                .slice_mut(s![t, b, ..])
                .assign(&ArrayView1::from(sequence.input(t)));
        }

        self.y
            .index_axis_mut(Axis(1), b)
            .iter_mut()
            .zip(targets)
            .for_each(|(y, &label)| *y = label as usize);

        self.filled += 1;
        Ok(())
    }

    /// Hands over the batch once every column is filled, leaving an empty one in its place.
    pub fn take(&mut self) -> Option<Batch> {
        if !self.is_full() {
            return None;
        }

        self.filled = 0;
        let (x_dim, y_dim) = (self.x.raw_dim(), self.y.raw_dim());
        let x = mem::replace(&mut self.x, Array3::zeros(x_dim));
        let y = mem::replace(&mut self.y, Array2::zeros(y_dim));

        Some(Batch { x, y })
    }
}
