mod batch;
mod shuffle;
mod source;

pub use batch::{Batch, BatchErr, Batcher};
pub use shuffle::ShuffleRepeat;
pub use source::{EpochIter, EpochSource, RecordFile, SequenceSource};
