//! Training records on disk.
//!
//! # Record Store Format
//!
//! A store is written once, in committed batches, and read back in order:
//!
//! ```text
//! ┌──────────────┬──────────────────────────────┬─────────────────────┐
//! │ Header       │ Batch N … N+1 …              │ Batch trailer       │
//! ├──────────────┼──────────────────────────────┼─────────────────────┤
//! │ `SVLRv1\0\0` │ u64: count                   │ u32: batch checksum │
//! │              │ u32: key_len, [u8] key       │                     │
//! │              │ u64: value_len, [u8] value   │                     │
//! └──────────────┴──────────────────────────────┴─────────────────────┘
//! ```
//!
//! All integers are little-endian. The checksum is the CRC32 of the batch
//! bytes from `count` through the last value. Values are usually bincode
//! encoded [`Datum`]s keyed by [`record_key`].
//!
//! # Example
//!
//! ```rust
//! use softmax_vector_loss::records::{Datum, RecordReader, RecordWriter, WriteBatch};
//!
//! # fn main() -> Result<(), softmax_vector_loss::error::RecordError> {
//! let path = std::env::temp_dir().join(format!("doc-{}.svlr", std::process::id()));
//! # let _ = std::fs::remove_file(&path);
//! let datum = Datum::new(1, 1, 2, vec![0, 255], vec![0.0, 3.5]);
//!
//! let mut writer = RecordWriter::create(&path)?;
//! let mut batch = WriteBatch::default();
//! batch.put("00000000_a.png", datum.encode()?);
//! writer.write(batch)?;
//! writer.finish()?;
//!
//! let records = RecordReader::open(&path)?.collect::<Result<Vec<_>, _>>()?;
//! assert_eq!(Datum::decode(&records[0].1)?, datum);
//! # std::fs::remove_file(&path)?;
//! # Ok(())
//! # }
//! ```

pub mod ingest;

use crate::error::RecordError;
use crate::float::Float;
use crate::tensors::Tensor;
use briny::prelude::*;
use crc32fast::Hasher as Crc32;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Magic bytes opening every record store.
pub const RECORD_MAGIC: &[u8; 8] = b"SVLRv1\0\0";

/// Key of the record built from list entry `line_id`.
///
/// The zero-padded prefix keeps keys unique and sorted in list order.
pub fn record_key(line_id: usize, path: &str) -> String {
    format!("{line_id:08}_{path}")
}

/// One training example: an image in channel-major (CHW) order and its
/// continuous label vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datum {
    pub channels: u32,
    pub height: u32,
    pub width: u32,
    pub data: Vec<u8>,
    pub labels: Vec<f32>,
}

impl Validate for Datum {
    fn validate(&self) -> Result<(), ValidationError> {
        let expected = u64::from(self.channels)
            .checked_mul(u64::from(self.height))
            .and_then(|n| n.checked_mul(u64::from(self.width)))
            .ok_or(ValidationError)?;
        if self.data.len() as u64 != expected {
            return Err(ValidationError);
        }
        Ok(())
    }
}

impl Datum {
    pub fn new(channels: u32, height: u32, width: u32, data: Vec<u8>, labels: Vec<f32>) -> Self {
        Self {
            channels,
            height,
            width,
            data,
            labels,
        }
    }

    /// Serializes the datum with bincode.
    ///
    /// # Errors
    /// [`RecordError::Codec`] if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>, RecordError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserializes and validates a datum.
    ///
    /// # Errors
    /// [`RecordError::Codec`] for undecodable bytes, [`RecordError::Malformed`]
    /// when the pixel buffer disagrees with the dimensions.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let raw: Self = bincode::deserialize(bytes)?;
        TrustedData::new(raw)
            .map(TrustedData::into_inner)
            .map_err(|_| RecordError::Malformed)
    }

    /// The image as a `[1, channels, height, width]` tensor of raw pixel values.
    ///
    /// # Errors
    /// [`RecordError::Malformed`] when the pixel buffer disagrees with the
    /// dimensions, which only a datum assembled by hand can do.
    pub fn image_tensor<T: Float>(&self) -> Result<Tensor<T>, RecordError> {
        self.validate().map_err(|_| RecordError::Malformed)?;
        let shape = vec![1, self.channels as usize, self.height as usize, self.width as usize];
        let data = self.data.iter().map(|&v| T::from_f32(f32::from(v))).collect();
        Ok(Tensor::new(shape, data))
    }

    /// The labels as a `[1, labels.len()]` tensor, ready to be a loss bottom.
    pub fn label_tensor<T: Float>(&self) -> Tensor<T> {
        let data = self.labels.iter().map(|&v| T::from_f32(v)).collect();
        Tensor::new(vec![1, self.labels.len()], data)
    }
}

/// Records committed together by [`RecordWriter::write`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    entries: Vec<(String, Vec<u8>)>,
}

impl WriteBatch {
    /// Queues a record.
    pub fn put(&mut self, key: impl Into<String>, value: Vec<u8>) {
        self.entries.push((key.into(), value));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Writes a new record store batch by batch.
#[derive(Debug)]
pub struct RecordWriter {
    file: BufWriter<File>,
    records: u64,
    batches: u64,
}

impl RecordWriter {
    /// Creates the store at `path` and writes the header.
    ///
    /// # Errors
    /// [`RecordError::Exists`] if anything is already at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|err| match err.kind() {
                io::ErrorKind::AlreadyExists => RecordError::Exists(path.to_path_buf()),
                _ => RecordError::Io(err),
            })?;
        let mut file = BufWriter::new(file);
        file.write_all(RECORD_MAGIC)?;
        Ok(Self {
            file,
            records: 0,
            batches: 0,
        })
    }

    /// Commits a batch. Empty batches are skipped.
    ///
    /// # Errors
    /// I/O failures, or [`RecordError::Key`] for a key longer than `u32::MAX` bytes.
    pub fn write(&mut self, batch: WriteBatch) -> Result<(), RecordError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut buf = Vec::new();
        buf.extend_from_slice(&(batch.len() as u64).to_le_bytes());
        for (key, value) in &batch.entries {
            let key_len = u32::try_from(key.len()).map_err(|_| RecordError::Key)?;
            buf.extend_from_slice(&key_len.to_le_bytes());
            buf.extend_from_slice(key.as_bytes());
            buf.extend_from_slice(&(value.len() as u64).to_le_bytes());
            buf.extend_from_slice(value);
        }

        let mut hasher = Crc32::new();
        hasher.update(&buf);
        self.file.write_all(&buf)?;
        self.file.write_all(&hasher.finalize().to_le_bytes())?;
        self.file.flush()?;

        self.records += batch.len() as u64;
        self.batches += 1;
        Ok(())
    }

    /// Records committed so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Flushes the store and returns the number of records in it.
    ///
    /// # Errors
    /// I/O failures while flushing.
    pub fn finish(mut self) -> Result<u64, RecordError> {
        self.file.flush()?;
        tracing::debug!(records = self.records, batches = self.batches, "record store closed");
        Ok(self.records)
    }
}

/// Reads `(key, value)` records in the order they were committed.
///
/// Each batch is verified against its checksum before any of its records are
/// yielded. Iteration stops after the first error.
#[derive(Debug)]
pub struct RecordReader {
    file: BufReader<File>,
    pending: VecDeque<(String, Vec<u8>)>,
    batch: u64,
    failed: bool,
}

impl RecordReader {
    /// Opens a store and checks its magic.
    ///
    /// # Errors
    /// I/O failures, or [`RecordError::BadMagic`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecordError> {
        let mut file = BufReader::new(File::open(path)?);
        let mut magic = [0u8; 8];
        read_exact(&mut file, &mut magic).map_err(|err| match err {
            RecordError::Truncated => RecordError::BadMagic,
            other => other,
        })?;
        if &magic != RECORD_MAGIC {
            return Err(RecordError::BadMagic);
        }
        Ok(Self {
            file,
            pending: VecDeque::new(),
            batch: 0,
            failed: false,
        })
    }

    /// Loads the next batch; `false` at a clean end of file.
    fn next_batch(&mut self) -> Result<bool, RecordError> {
        if self.file.fill_buf()?.is_empty() {
            return Ok(false);
        }

        let mut hasher = Crc32::new();
        let mut buf8 = [0u8; 8];
        let mut buf4 = [0u8; 4];

        read_exact(&mut self.file, &mut buf8)?;
        hasher.update(&buf8);
        let count = u64::from_le_bytes(buf8);

        let mut entries = VecDeque::new();
        for _ in 0..count {
            read_exact(&mut self.file, &mut buf4)?;
            hasher.update(&buf4);
            let key = read_bytes(&mut self.file, u64::from(u32::from_le_bytes(buf4)))?;
            hasher.update(&key);

            read_exact(&mut self.file, &mut buf8)?;
            hasher.update(&buf8);
            let value = read_bytes(&mut self.file, u64::from_le_bytes(buf8))?;
            hasher.update(&value);

            let key = String::from_utf8(key).map_err(|_| RecordError::Key)?;
            entries.push_back((key, value));
        }

        read_exact(&mut self.file, &mut buf4)?;
        if u32::from_le_bytes(buf4) != hasher.finalize() {
            return Err(RecordError::Checksum { batch: self.batch });
        }

        self.batch += 1;
        self.pending = entries;
        Ok(true)
    }
}

impl Iterator for RecordReader {
    type Item = Result<(String, Vec<u8>), RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pending.is_empty() {
            if self.failed {
                return None;
            }
            match self.next_batch() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(err) => {
                    self.failed = true;
                    return Some(Err(err));
                }
            }
        }
        self.pending.pop_front().map(Ok)
    }
}

fn read_exact(file: &mut impl Read, buf: &mut [u8]) -> Result<(), RecordError> {
    file.read_exact(buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => RecordError::Truncated,
        _ => RecordError::Io(err),
    })
}

fn read_bytes(file: &mut impl Read, len: u64) -> Result<Vec<u8>, RecordError> {
    let mut out = Vec::new();
    file.by_ref().take(len).read_to_end(&mut out)?;
    if out.len() as u64 != len {
        return Err(RecordError::Truncated);
    }
    Ok(out)
}
