mod error;
pub mod example;
mod sequence;
mod tfrecord;

pub use error::{RecordErr, Result};
pub use sequence::{MelodySequence, SequenceSpec, encode_sequence_example, parse_sequence_example};
pub use tfrecord::{RecordReader, RecordWriter, masked_crc32c, open};
