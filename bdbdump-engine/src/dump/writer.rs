//! Dump driver: probe, then stream records into a sink

use std::fmt;
use std::io::{Read, Seek, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::access::AccessMethod;
use crate::database::Database;
use crate::error::{DumpError, DumpResult};

use super::format::{write_footer, write_header, write_record};

/// Progress of a [`Dumper`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpState {
    Start,
    Probing,
    Iterating,
    /// Terminator written and flushed
    Terminated,
    Failed,
}

impl fmt::Display for DumpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DumpState::Start => "start",
            DumpState::Probing => "probing",
            DumpState::Iterating => "iterating",
            DumpState::Terminated => "terminated",
            DumpState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a completed dump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpSummary {
    pub method: AccessMethod,
    pub records: u64,
}

/// Writes one database into a sink in the bytevalue format
///
/// A dumper runs once. Nothing reaches the sink until the access method is
/// known, and on failure whatever was already written stays in the sink.
/// Each record is handed to the sink in a single `write_all`, and the sink is
/// flushed before a read error is reported.
pub struct Dumper<W: Write> {
    sink: W,
    state: DumpState,
}

impl<W: Write> Dumper<W> {
    pub fn new(sink: W) -> Self {
        Dumper {
            sink,
            state: DumpState::Start,
        }
    }

    pub fn state(&self) -> DumpState {
        self.state
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Dump the database at `path`, probing hash then btree
    pub fn dump(&mut self, path: &Path) -> DumpResult<DumpSummary> {
        self.dump_with(path, Database::probe)
    }

    /// Dump using `open` to obtain the database handle
    pub fn dump_with<R, F>(&mut self, path: &Path, open: F) -> DumpResult<DumpSummary>
    where
        R: Read + Seek,
        F: FnOnce(&Path) -> DumpResult<Database<R>>,
    {
        if self.state != DumpState::Start {
            return Err(DumpError::Reused { state: self.state });
        }

        self.state = DumpState::Probing;
        let db = match open(path) {
            Ok(db) => db,
            Err(err) => {
                self.state = DumpState::Failed;
                return Err(err);
            }
        };

        self.state = DumpState::Iterating;
        match stream(db, &mut self.sink) {
            Ok(summary) => {
                self.state = DumpState::Terminated;
                info!(
                    path = %path.display(),
                    method = %summary.method,
                    records = summary.records,
                    "dump complete"
                );
                Ok(summary)
            }
            Err(err) => {
                self.state = DumpState::Failed;
                Err(err)
            }
        }
    }
}

/// Write every record of `db` into `sink`
///
/// Each record goes to the sink in one `write_all`, so `emitted` always counts
/// the records the sink has accepted.
fn stream<R: Read + Seek, W: Write>(db: Database<R>, sink: &mut W) -> DumpResult<DumpSummary> {
    let path = db.path().to_path_buf();
    let method = db.method();
    let mut emitted = 0u64;

    write_header(sink, method).map_err(|source| DumpError::SinkWrite { emitted, source })?;

    for record in db.into_records() {
        let record = match record {
            Ok(record) => record,
            Err(source) => {
                // Records already accepted must reach the destination before
                // the read error is reported against them
                if let Err(flush) = sink.flush() {
                    warn!(error = %source, "record read failed, then the sink could not be flushed");
                    return Err(DumpError::SinkWrite {
                        emitted,
                        source: flush,
                    });
                }
                return Err(DumpError::RecordRead {
                    path,
                    method,
                    emitted,
                    source,
                });
            }
        };
        write_record(sink, &record).map_err(|source| DumpError::SinkWrite { emitted, source })?;
        emitted += 1;
    }

    write_footer(sink)
        .and_then(|()| sink.flush())
        .map_err(|source| DumpError::SinkWrite { emitted, source })?;
    debug!(records = emitted, "terminator flushed");

    Ok(DumpSummary {
        method,
        records: emitted,
    })
}
