use log::debug;
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{EpochIter, EpochSource};
use crate::Result;

/// Shuffles the items of a source through a fixed size buffer while repeating it.
///
/// Every emitted item is drawn uniformly from the buffer, which is then refilled with the next item
/// of the source. Once a pass ends the source is opened again, so items of consecutive epochs may
/// be mixed in the buffer. An epoch that yields nothing ends the stream, as does the first error.
pub struct ShuffleRepeat<S: EpochSource> {
    source: S,
    buffer: Vec<S::Item>,
    capacity: usize,
    repeat: Option<usize>,
    epoch: usize,
    epoch_items: usize,
    current: Option<EpochIter<S::Item>>,
    rng: StdRng,
    exhausted: bool,
}

impl<S: EpochSource> ShuffleRepeat<S> {
    /// Creates a new `ShuffleRepeat`.
    ///
    /// # Arguments
    /// * `source` - The source to read every epoch from.
    /// * `capacity` - The size of the shuffle buffer, `1` keeps the source's order.
    /// * `repeat` - The amount of epochs, `None` repeats forever.
    /// * `seed` - The seed of the shuffling, `None` draws one from the OS.
    pub fn new(source: S, capacity: usize, repeat: Option<usize>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            source,
            buffer: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            repeat,
            epoch: 0,
            epoch_items: 0,
            current: None,
            rng,
            exhausted: false,
        }
    }

    /// Returns the amount of epochs started so far.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Pulls the next item in source order, moving on to the next epoch when needed.
    fn pull(&mut self) -> Result<Option<S::Item>> {
        loop {
            if let Some(items) = &mut self.current {
                match items.next() {
                    Some(item) => {
                        self.epoch_items += 1;
                        return item.map(Some);
                    }
                    None => {
                        self.current = None;
                        debug!(epoch = self.epoch, items = self.epoch_items; "epoch finished");

                        if self.epoch_items == 0 {
                            return Ok(None);
                        }
                    }
                }
            }

            if self.repeat.is_some_and(|repeat| self.epoch >= repeat) {
                return Ok(None);
            }

            self.current = Some(self.source.open_epoch()?);
            self.epoch += 1;
            self.epoch_items = 0;
        }
    }
}

impl<S: EpochSource> Iterator for ShuffleRepeat<S> {
    type Item = Result<S::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.exhausted && self.buffer.len() < self.capacity {
            match self.pull() {
                Ok(Some(item)) => self.buffer.push(item),
                Ok(None) => self.exhausted = true,
                Err(e) => {
                    self.exhausted = true;
                    self.buffer.clear();
                    return Some(Err(e));
                }
            }
        }

        if self.buffer.is_empty() {
            return None;
        }

        let idx = self.rng.random_range(0..self.buffer.len());
        Some(Ok(self.buffer.swap_remove(idx)))
    }
}
