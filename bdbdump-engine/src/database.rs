//! Opened database handles and record iteration
//!
//! A [`Database`] is a file opened read-only under one access method. It is
//! consumed by [`Database::into_records`], so each iteration needs a fresh
//! open.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::iter::FusedIterator;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::access::AccessMethod;
use crate::error::{DumpError, DumpResult, ProbeError, ProbeFailures, StorageResult};
use crate::storage::btree::BtreeCursor;
use crate::storage::hash::HashCursor;
use crate::storage::meta::{BtreeMeta, HashMeta, MetaHeader, META_READ_SIZE};
use crate::storage::page::PageIO;
use crate::storage::Record;

/// Metadata of an opened database
#[derive(Debug, Clone)]
pub enum Meta {
    Hash(HashMeta),
    Btree(BtreeMeta),
}

impl Meta {
    pub fn header(&self) -> &MetaHeader {
        match self {
            Meta::Hash(meta) => &meta.header,
            Meta::Btree(meta) => &meta.header,
        }
    }

    pub fn method(&self) -> AccessMethod {
        match self {
            Meta::Hash(_) => AccessMethod::Hash,
            Meta::Btree(_) => AccessMethod::Btree,
        }
    }
}

/// A database file opened read-only under a known access method
pub struct Database<R = File> {
    path: PathBuf,
    meta: Meta,
    io: PageIO<R>,
}

impl Database<File> {
    /// Open `path` read-only as a database of the given access method
    pub fn open_as(path: &Path, method: AccessMethod) -> Result<Self, ProbeError> {
        let file = OpenOptions::new().read(true).open(path)?;
        Database::from_reader(path, file, method)
    }

    /// Open `path` under the first access method in probe order that accepts it
    pub fn probe(path: &Path) -> DumpResult<Self> {
        probe_with(path, |method| Database::open_as(path, method))
    }
}

impl<R: Read + Seek> Database<R> {
    /// Open an already opened reader as a database of the given access method
    pub fn from_reader(
        path: impl Into<PathBuf>,
        mut reader: R,
        method: AccessMethod,
    ) -> Result<Self, ProbeError> {
        let mut header = vec![0u8; META_READ_SIZE];
        reader.seek(SeekFrom::Start(0))?;
        reader.read_exact(&mut header)?;

        let meta = match method {
            AccessMethod::Hash => Meta::Hash(HashMeta::from_bytes(&header)?),
            AccessMethod::Btree => Meta::Btree(BtreeMeta::from_bytes(&header)?),
        };
        let io = PageIO::new(reader, meta.header().layout())?;

        Ok(Database {
            path: path.into(),
            meta,
            io,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn method(&self) -> AccessMethod {
        self.meta.method()
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Number of whole pages in the file
    pub fn page_count(&self) -> u32 {
        self.io.page_count()
    }

    /// Iterate every record in the access method's native order
    pub fn into_records(self) -> Records<R> {
        let page_count = self.io.page_count();
        let cursor = match self.meta {
            Meta::Hash(meta) => RecordCursor::Hash(HashCursor::new(meta, page_count)),
            Meta::Btree(meta) => RecordCursor::Btree(BtreeCursor::new(meta.root, page_count)),
        };
        Records {
            io: self.io,
            cursor,
            done: false,
        }
    }
}

/// Try each access method in probe order with `open`, keeping every failure
pub fn probe_with<R, F>(path: &Path, mut open: F) -> DumpResult<Database<R>>
where
    R: Read + Seek,
    F: FnMut(AccessMethod) -> Result<Database<R>, ProbeError>,
{
    let mut failures = ProbeFailures::default();

    for method in AccessMethod::PROBE_ORDER {
        match open(method) {
            Ok(db) => {
                debug!(path = %path.display(), %method, "opened database");
                return Ok(db);
            }
            Err(err) if err.is_format_mismatch() => {
                debug!(path = %path.display(), %method, error = %err, "not this access method");
                failures.push(method, err);
            }
            Err(err) => {
                warn!(path = %path.display(), %method, error = %err, "access method rejected file");
                failures.push(method, err);
            }
        }
    }

    Err(DumpError::UnsupportedDatabaseFormat {
        path: path.to_path_buf(),
        failures,
    })
}

enum RecordCursor {
    Hash(HashCursor),
    Btree(BtreeCursor),
}

/// Lazy iterator over the records of a database
///
/// Stops after the first error.
pub struct Records<R> {
    io: PageIO<R>,
    cursor: RecordCursor,
    done: bool,
}

impl<R: Read + Seek> Iterator for Records<R> {
    type Item = StorageResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let next = match &mut self.cursor {
            RecordCursor::Hash(cursor) => cursor.next_record(&mut self.io),
            RecordCursor::Btree(cursor) => cursor.next_record(&mut self.io),
        }
        .transpose();

        if !matches!(next, Some(Ok(_))) {
            self.done = true;
        }
        next
    }
}

impl<R: Read + Seek> FusedIterator for Records<R> {}
