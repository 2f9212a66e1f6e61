use std::path::PathBuf;

use log::debug;
use records::{MelodySequence, SequenceSpec};

use super::ShuffleRepeat;
use crate::{Result, TrainingConfig};

/// The items of a single pass over a source.
pub type EpochIter<T> = Box<dyn Iterator<Item = Result<T>> + Send>;

/// Something that can be read from the start again for every epoch.
pub trait EpochSource {
    type Item;

    /// Starts a new pass over the source.
    fn open_epoch(&mut self) -> Result<EpochIter<Self::Item>>;
}

/// A TFRecord file, re-opened on every epoch.
#[derive(Debug, Clone)]
pub struct RecordFile {
    path: PathBuf,
    buffer_size: usize,
    verify_checksums: bool,
}

impl RecordFile {
    /// Creates a new `RecordFile`.
    ///
    /// # Arguments
    /// * `path` - The path of the record file.
    /// * `buffer_size` - The capacity of the read buffer in bytes.
    /// * `verify_checksums` - Whether to verify the checksums of every record.
    pub fn new<P: Into<PathBuf>>(path: P, buffer_size: usize, verify_checksums: bool) -> Self {
        Self {
            path: path.into(),
            buffer_size,
            verify_checksums,
        }
    }
}

impl EpochSource for RecordFile {
    type Item = Vec<u8>;

    fn open_epoch(&mut self) -> Result<EpochIter<Vec<u8>>> {
        let reader = records::open(&self.path, self.buffer_size)?
            .verify_checksums(self.verify_checksums);

        Ok(Box::new(reader.map(|record| record.map_err(Into::into))))
    }
}

/// The whole input pipeline: records, shuffled and repeated, parsed into melodies.
pub struct SequenceSource<S: EpochSource<Item = Vec<u8>>> {
    records: ShuffleRepeat<S>,
    spec: SequenceSpec,
}

impl SequenceSource<RecordFile> {
    /// Builds the pipeline the configuration describes.
    pub fn from_config(cfg: &TrainingConfig) -> Self {
        let file = RecordFile::new(
            &cfg.dataset_path,
            cfg.read_buffer_size.get(),
            cfg.verify_checksums,
        );

        debug!("reading melodies from {}", cfg.dataset_path.display());

        let records = ShuffleRepeat::new(
            file,
            cfg.shuffle_buffer.get(),
            cfg.repeat.map(|n| n.get()),
            cfg.seed,
        );

        Self::new(records, SequenceSpec::new(cfg.input_size.get()))
    }
}

impl<S: EpochSource<Item = Vec<u8>>> SequenceSource<S> {
    pub fn new(records: ShuffleRepeat<S>, spec: SequenceSpec) -> Self {
        Self { records, spec }
    }
}

impl<S: EpochSource<Item = Vec<u8>>> Iterator for SequenceSource<S> {
    type Item = Result<MelodySequence>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        Some(record.and_then(|bytes| Ok(records::parse_sequence_example(&bytes, &self.spec)?)))
    }
}
