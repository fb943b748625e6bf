//! Error types for layer lifecycle calls, parameter loading and record I/O.
//!
//! Every variant of [`LayerError`] is a contract violation: a malformed graph
//! definition or a call made out of order. Numeric edge cases never surface
//! here; they are absorbed into the loss value.

use std::path::PathBuf;
use thiserror::Error;

/// A violated layer contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayerError {
    /// Wrong number of input (bottom) tensors.
    #[error("{layer} takes {expected} bottom tensor(s), got {actual}")]
    BottomCount {
        layer: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Wrong number of output (top) tensors.
    #[error("{layer} takes {expected} top tensor(s), got {actual}")]
    TopCount {
        layer: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Two buffers disagree about their shape.
    #[error("{what}: expected shape {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
    /// A buffer holds a different number of elements than its shape implies.
    #[error("{what}: expected {expected} elements, got {actual}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    /// A lifecycle call arrived before `setup`.
    #[error("{0} used before setup")]
    NotSetUp(&'static str),
    /// The layer parameters failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Failure to load or validate layer parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The temperature is NaN or infinite.
    #[error("temperature must be finite")]
    NonFiniteTemperature,
    /// The parameter file could not be read.
    #[error("cannot read parameters: {0}")]
    Io(String),
    /// The parameter document is not valid JSON for the expected shape.
    #[error("cannot parse parameters: {0}")]
    Parse(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse(err.to_string())
    }
}

/// Failure reading or writing a record store.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Stores are written once; an existing file is never appended to.
    #[error("record store {0} already exists")]
    Exists(PathBuf),
    /// The file does not start with the record store magic.
    #[error("not a record store (bad magic)")]
    BadMagic,
    /// A committed batch does not match its checksum.
    #[error("batch {batch} is corrupted (checksum mismatch)")]
    Checksum { batch: u64 },
    /// The file ends inside a batch.
    #[error("record store is truncated")]
    Truncated,
    /// A key is not valid UTF-8 or too long to frame.
    #[error("invalid record key")]
    Key,
    #[error("cannot encode or decode datum: {0}")]
    Codec(#[from] bincode::Error),
    /// A decoded datum's pixel buffer disagrees with its dimensions.
    #[error("malformed datum")]
    Malformed,
}

/// Failure converting an image list into a record store.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Record(#[from] RecordError),
    /// A label token is not a number.
    #[error("entry {entry} ({path}): cannot parse label {token:?}")]
    Label {
        entry: usize,
        path: String,
        token: String,
    },
    /// The list ends before an entry has all its labels.
    #[error("entry {entry} ({path}): expected {expected} labels, got {actual}")]
    MissingLabels {
        entry: usize,
        path: String,
        expected: usize,
        actual: usize,
    },
    /// Images in one store must all decode to the same number of bytes.
    #[error("{path}: data size {actual} differs from {expected}")]
    DataSize {
        path: String,
        expected: usize,
        actual: usize,
    },
    /// `batch_size` of zero.
    #[error("batch size must be positive")]
    BatchSize,
    /// Command-line arguments that do not describe a conversion.
    #[error("{0}")]
    Usage(String),
}
