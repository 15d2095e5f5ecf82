//! Access methods and the order a file of unknown organization is probed in

use std::fmt;

use crate::storage::meta::{BTREE_MAGIC, HASH_MAGIC};
use crate::storage::page::PageType;

/// On-disk organization of a database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMethod {
    /// Linear hash table; enumerates in bucket order
    Hash,
    /// Btree; enumerates in ascending key order
    Btree,
}

impl AccessMethod {
    /// Probe order for files whose access method is unknown
    pub const PROBE_ORDER: [AccessMethod; 2] = [AccessMethod::Hash, AccessMethod::Btree];

    /// Name used in the dump header's `type=` line
    pub fn name(self) -> &'static str {
        match self {
            AccessMethod::Hash => "hash",
            AccessMethod::Btree => "btree",
        }
    }

    /// Parse a `type=` name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "hash" => Some(AccessMethod::Hash),
            "btree" => Some(AccessMethod::Btree),
            _ => None,
        }
    }

    /// Magic number at offset 12 of the metadata page
    pub fn magic(self) -> u32 {
        match self {
            AccessMethod::Hash => HASH_MAGIC,
            AccessMethod::Btree => BTREE_MAGIC,
        }
    }

    /// Page type of the metadata page
    pub fn meta_page_type(self) -> PageType {
        match self {
            AccessMethod::Hash => PageType::HashMeta,
            AccessMethod::Btree => PageType::BtreeMeta,
        }
    }
}

impl fmt::Display for AccessMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
