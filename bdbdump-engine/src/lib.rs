//! bdbdump engine - read-only dumper for Berkeley DB hash and btree files
//!
//! This crate reads database files without the native library and writes
//! their records in the portable `db_load` bytevalue text format.

pub mod access;
pub mod database;
pub mod dump;
pub mod error;
pub mod storage;

pub use access::AccessMethod;
pub use database::{Database, Records};
pub use dump::{dump, DumpReader, DumpState, DumpSummary, Dumper};
pub use error::{DumpError, DumpResult, ParseError, ProbeError, StorageError};
pub use storage::Record;
