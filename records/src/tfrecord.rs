//! Reading and writing of the TFRecord framing.
//!
//! Every record is laid out as
//! `len: u64 | masked_crc32c(len): u32 | data: [u8; len] | masked_crc32c(data): u32`,
//! all integers little endian.

use std::{
    fs::File,
    io::{self, BufReader, ErrorKind, Read, Write},
    path::Path,
};

use log::debug;

use crate::{RecordErr, Result};

type LenType = u64;
type CrcType = u32;

const LEN_TYPE_SIZE: usize = size_of::<LenType>();
const CRC_TYPE_SIZE: usize = size_of::<CrcType>();
const HEADER_SIZE: usize = LEN_TYPE_SIZE + CRC_TYPE_SIZE;
const MASK_DELTA: u32 = 0xa282_ead8;

/// Computes the masked crc32c checksum the TFRecord format stores next to lengths and payloads.
///
/// # Arguments
/// * `bytes` - The bytes to checksum.
///
/// # Returns
/// The rotated and offset crc32c of `bytes`.
pub fn masked_crc32c(bytes: &[u8]) -> u32 {
    let crc = crc32c::crc32c(bytes);
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Opens a record file for reading.
///
/// # Arguments
/// * `path` - The path of the record file.
/// * `buffer_size` - The capacity of the read buffer in bytes.
///
/// # Returns
/// A checked `RecordReader` over the file or an io error if it could not be opened.
pub fn open<P: AsRef<Path>>(path: P, buffer_size: usize) -> Result<RecordReader<BufReader<File>>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    debug!("opened record file {}", path.display());

    Ok(RecordReader::new(BufReader::with_capacity(buffer_size, file)))
}

/// The reading end of a record stream.
///
/// Yields every record's payload in order. Iteration stops after the first error.
pub struct RecordReader<R: Read> {
    rx: R,
    offset: u64,
    check_crc: bool,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    /// Creates a new `RecordReader` that verifies both checksums of every record.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub fn new(rx: R) -> Self {
        Self {
            rx,
            offset: 0,
            check_crc: true,
            done: false,
        }
    }

    /// Creates a new `RecordReader` that skips checksum verification.
    ///
    /// # Arguments
    /// * `rx` - The underlying reader.
    pub fn unchecked(rx: R) -> Self {
        Self::new(rx).verify_checksums(false)
    }

    /// Sets whether the checksums of the records read from now on are verified.
    pub fn verify_checksums(mut self, check_crc: bool) -> Self {
        self.check_crc = check_crc;
        self
    }

    /// Reads the next record.
    ///
    /// # Returns
    /// `None` on a clean end of stream, the record's payload otherwise, or an error if the
    /// stream ends mid record or a checksum doesn't match.
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        let start = self.offset;

        let mut header = [0; HEADER_SIZE];
        match self.fill(&mut header)? {
            0 => return Ok(None),
            HEADER_SIZE => {}
            _ => return Err(RecordErr::Truncated { offset: start }),
        }

        let (len_bytes, crc_bytes) = header.split_at(LEN_TYPE_SIZE);
        self.verify(start, "length", len_bytes, crc_bytes)?;

        let mut len_buf = [0; LEN_TYPE_SIZE];
        len_buf.copy_from_slice(len_bytes);
        let len = LenType::from_le_bytes(len_buf);

        // Sized by the bytes actually read, not by the header.
        let mut data = Vec::new();
        let read = (&mut self.rx).take(len).read_to_end(&mut data)?;
        self.offset += read as u64;

        let mut footer = [0; CRC_TYPE_SIZE];
        if read as u64 != len || self.fill(&mut footer)? != CRC_TYPE_SIZE {
            return Err(RecordErr::Truncated { offset: start });
        }

        self.verify(start, "payload", &data, &footer)?;
        Ok(Some(data))
    }

    /// Reads into `buf` until it's full or the underlying reader is exhausted.
    ///
    /// # Returns
    /// The amount of bytes read.
    fn fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut read = 0;

        while read < buf.len() {
            match self.rx.read(&mut buf[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        self.offset += read as u64;
        Ok(read)
    }

    fn verify(&self, offset: u64, what: &'static str, bytes: &[u8], crc: &[u8]) -> Result<()> {
        if !self.check_crc {
            return Ok(());
        }

        let mut crc_buf = [0; CRC_TYPE_SIZE];
        crc_buf.copy_from_slice(crc);

        if CrcType::from_le_bytes(crc_buf) != masked_crc32c(bytes) {
            return Err(RecordErr::Corrupted { offset, what });
        }

        Ok(())
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let ret = self.read_record().transpose();
        if !matches!(ret, Some(Ok(_))) {
            self.done = true;
        }

        ret
    }
}

/// The writing end of a record stream.
pub struct RecordWriter<W: Write> {
    tx: W,
}

impl<W: Write> RecordWriter<W> {
    /// Creates a new `RecordWriter`.
    ///
    /// # Arguments
    /// * `tx` - The underlying writer.
    pub fn new(tx: W) -> Self {
        Self { tx }
    }

    /// Frames and writes `data` as a single record.
    ///
    /// # Arguments
    /// * `data` - The record's payload.
    pub fn write_record(&mut self, data: &[u8]) -> Result<()> {
        let len = (data.len() as LenType).to_le_bytes();

        self.tx.write_all(&len)?;
        self.tx.write_all(&masked_crc32c(&len).to_le_bytes())?;
        self.tx.write_all(data)?;
        self.tx.write_all(&masked_crc32c(data).to_le_bytes())?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        Ok(self.tx.flush()?)
    }

    /// Unwraps this writer, returning the underlying writer.
    pub fn into_inner(self) -> W {
        self.tx
    }
}
