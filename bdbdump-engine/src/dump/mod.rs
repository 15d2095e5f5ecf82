//! The bytevalue dump format
//!
//! - [`format`]: the line grammar
//! - [`writer`]: the driver that probes a database and streams it out
//! - [`reader`]: parsing a dump back into records

pub mod format;
pub mod reader;
pub mod writer;

use std::io::Write;
use std::path::Path;

use crate::error::DumpResult;

pub use reader::{read_dump, DumpReader};
pub use writer::{DumpState, DumpSummary, Dumper};

/// Dump the database at `path` into `sink`
pub fn dump<W: Write>(path: &Path, sink: W) -> DumpResult<DumpSummary> {
    Dumper::new(sink).dump(path)
}
