//! Storage layer for Berkeley DB hash and btree files
//!
//! This module handles the low-level binary format of the database files:
//! - Page I/O in either byte order
//! - Metadata page parsing
//! - Item decoding, overflow chains and duplicate sets
//! - Hash bucket and btree leaf traversal

pub mod page;
pub mod meta;
pub mod record;
pub mod btree;
pub mod hash;

#[cfg(test)]
pub(crate) mod fixtures;

pub use page::{Endian, Page, PageIO, PageType};
pub use meta::{BtreeMeta, HashMeta, MetaHeader};
pub use record::Record;
pub use btree::{BtreeCursor, DuplicateCursor};
pub use hash::HashCursor;
