//! Error types for probing, reading and dumping databases
//!
//! Errors are layered the same way the dump runs:
//! - [`ProbeError`]: one access method could not open the file
//! - [`StorageError`]: a page or item could not be read during iteration
//! - [`DumpError`]: the failure surfaced to the caller of a dump
//! - [`ParseError`]: a dump text could not be read back

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::access::AccessMethod;
use crate::dump::DumpState;

/// Failure to open a file under one access method
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The metadata page could not be read at all
    #[error("cannot read metadata page: {0}")]
    Io(#[from] io::Error),

    /// The magic number belongs to some other format or access method
    #[error("not a {expected} database (magic {magic:#08x})")]
    NotRecognized { expected: AccessMethod, magic: u32 },

    /// Recognized, but uses a feature this reader does not handle
    #[error("unsupported {method} database: {reason}")]
    Unsupported { method: AccessMethod, reason: String },

    /// Recognized, but the metadata is inconsistent
    #[error("corrupt {method} metadata: {reason}")]
    Corrupt { method: AccessMethod, reason: String },
}

impl ProbeError {
    /// True when the file is simply not of the attempted access method
    pub fn is_format_mismatch(&self) -> bool {
        matches!(self, ProbeError::NotRecognized { .. })
    }
}

/// Probe failures of every access method tried, in probe order
#[derive(Debug, Default)]
pub struct ProbeFailures(Vec<(AccessMethod, ProbeError)>);

impl ProbeFailures {
    pub fn push(&mut self, method: AccessMethod, error: ProbeError) {
        self.0.push((method, error));
    }

    /// Failure recorded for `method`
    pub fn get(&self, method: AccessMethod) -> Option<&ProbeError> {
        self.0
            .iter()
            .find(|(tried, _)| *tried == method)
            .map(|(_, error)| error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(AccessMethod, ProbeError)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ProbeFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (method, error)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", method, error)?;
        }
        Ok(())
    }
}

/// Failure while reading pages or items of an opened database
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error reading page {pgno}: {source}")]
    Io {
        pgno: u32,
        #[source]
        source: io::Error,
    },

    #[error("corrupt page {pgno}: {reason}")]
    Corrupt { pgno: u32, reason: String },

    #[error("unsupported item on page {pgno}: {reason}")]
    Unsupported { pgno: u32, reason: String },
}

impl StorageError {
    pub fn corrupt(pgno: u32, reason: impl Into<String>) -> Self {
        StorageError::Corrupt {
            pgno,
            reason: reason.into(),
        }
    }

    pub fn unsupported(pgno: u32, reason: impl Into<String>) -> Self {
        StorageError::Unsupported {
            pgno,
            reason: reason.into(),
        }
    }

    /// Page the error was raised on
    pub fn pgno(&self) -> u32 {
        match self {
            StorageError::Io { pgno, .. }
            | StorageError::Corrupt { pgno, .. }
            | StorageError::Unsupported { pgno, .. } => *pgno,
        }
    }
}

/// Failure of a whole dump operation
#[derive(Error, Debug)]
pub enum DumpError {
    /// Neither access method could open the file
    #[error("{}: unsupported database format ({})", .path.display(), .failures)]
    UnsupportedDatabaseFormat {
        path: PathBuf,
        failures: ProbeFailures,
    },

    /// Iteration hit an I/O error or corruption
    #[error(
        "{}: error reading {} record after {} records emitted: {}",
        .path.display(),
        .method,
        .emitted,
        .source
    )]
    RecordRead {
        path: PathBuf,
        method: AccessMethod,
        emitted: u64,
        #[source]
        source: StorageError,
    },

    /// The output sink rejected a write
    #[error("error writing dump after {emitted} records emitted: {source}")]
    SinkWrite {
        emitted: u64,
        #[source]
        source: io::Error,
    },

    #[error("dumper cannot run again after reaching state {state}")]
    Reused { state: DumpState },
}

impl DumpError {
    /// Number of records fully written before the failure
    pub fn records_emitted(&self) -> u64 {
        match self {
            DumpError::UnsupportedDatabaseFormat { .. } | DumpError::Reused { .. } => 0,
            DumpError::RecordRead { emitted, .. } | DumpError::SinkWrite { emitted, .. } => {
                *emitted
            }
        }
    }
}

/// Failure to read a dump text back
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("I/O error reading dump: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: expected {expected:?}, found {found:?}")]
    UnexpectedLine {
        line: usize,
        expected: &'static str,
        found: String,
    },

    #[error("line {line}: unknown database type {found:?}")]
    UnknownType { line: usize, found: String },

    #[error("line {line}: data line must start with a single space")]
    MissingLeadingSpace { line: usize },

    #[error("line {line}: invalid hex data: {source}")]
    InvalidHex {
        line: usize,
        #[source]
        source: hex::FromHexError,
    },

    #[error("line {line}: key has no value line")]
    MissingValue { line: usize },

    #[error("dump ended after line {line} without DATA=END")]
    UnexpectedEof { line: usize },
}

/// Result type for page-level reads
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for dump operations
pub type DumpResult<T> = Result<T, DumpError>;
