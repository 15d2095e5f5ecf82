//! Metadata page (page 0) parsing
//!
//! Every hash and btree database starts with a metadata page. The first 72
//! bytes are shared by all access methods:
//!
//! - Offset 0x08: pgno (u32, always 0)
//! - Offset 0x0C: magic (u32, identifies the access method and byte order)
//! - Offset 0x10: version (u32)
//! - Offset 0x14: page size (u32)
//! - Offset 0x18: encryption algorithm (u8)
//! - Offset 0x19: page type (u8)
//! - Offset 0x1A: meta flags (u8)
//! - Offset 0x20: last_pgno (u32)
//! - Offset 0x30: access-method flags (u32)
//!
//! Btree metadata adds the root page at 0x58. Hash metadata adds the bucket
//! table geometry at 0x48 and the 32 spare-page offsets at 0x60.

use crate::access::AccessMethod;
use crate::error::ProbeError;

use super::page::{Endian, PageLayout, PageType};

/// Magic number of hash databases
pub const HASH_MAGIC: u32 = 0x061561;

/// Magic number of btree databases
pub const BTREE_MAGIC: u32 = 0x053162;

/// Bytes read from the start of the file to decode the metadata page
pub const META_READ_SIZE: usize = 512;

/// Oldest on-disk format version read
pub const MIN_VERSION: u32 = 7;

/// Newest on-disk format version read
pub const MAX_VERSION: u32 = 10;

/// Number of spare-page slots in hash metadata
pub const NCACHED: usize = 32;

const MAGIC_OFFSET: usize = 12;
const SPARES_OFFSET: usize = 96;

bitflags::bitflags! {
    /// Flags stored in the generic metadata header
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MetaFlags: u8 {
        /// Pages carry checksums
        const CHECKSUM = 0x01;
        /// Database is range-partitioned
        const PART_RANGE = 0x02;
        /// Database is partitioned by callback
        const PART_CALLBACK = 0x04;
    }
}

bitflags::bitflags! {
    /// Btree metadata flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BtreeFlags: u32 {
        const DUP = 0x001;
        /// Record-number tree (recno access method)
        const RECNO = 0x002;
        const RECNUM = 0x004;
        const FIXEDLEN = 0x008;
        const RENUMBER = 0x010;
        /// File holds named subdatabases
        const SUBDB = 0x020;
        const DUPSORT = 0x040;
        /// Keys and data are prefix-compressed
        const COMPRESS = 0x080;
    }
}

bitflags::bitflags! {
    /// Hash metadata flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HashFlags: u32 {
        const DUP = 0x01;
        const SUBDB = 0x02;
        const DUPSORT = 0x04;
    }
}

/// Generic metadata header shared by hash and btree files
#[derive(Debug, Clone)]
pub struct MetaHeader {
    pub magic: u32,
    pub version: u32,
    pub page_size: u32,
    pub encrypt_alg: u8,
    pub page_type: PageType,
    pub meta_flags: MetaFlags,
    /// Head of the free-page list
    pub free: u32,
    /// Number of the last page in the database
    pub last_pgno: u32,
    pub key_count: u32,
    pub record_count: u32,
    /// Access-method specific flag word
    pub flags: u32,
    /// Byte order the magic matched in
    pub endian: Endian,
}

impl MetaHeader {
    /// Decode and validate the shared header for `method`
    pub fn from_bytes(data: &[u8], method: AccessMethod) -> Result<Self, ProbeError> {
        if data.len() < META_READ_SIZE {
            return Err(ProbeError::Corrupt {
                method,
                reason: format!("metadata page truncated to {} bytes", data.len()),
            });
        }

        let endian = detect_endian(data, method.magic()).ok_or_else(|| {
            ProbeError::NotRecognized {
                expected: method,
                magic: Endian::Little.read_u32(&data[MAGIC_OFFSET..MAGIC_OFFSET + 4]),
            }
        })?;

        let header = MetaHeader {
            magic: endian.read_u32(&data[12..16]),
            version: endian.read_u32(&data[16..20]),
            page_size: endian.read_u32(&data[20..24]),
            encrypt_alg: data[24],
            page_type: PageType::from(data[25]),
            meta_flags: MetaFlags::from_bits_retain(data[26]),
            free: endian.read_u32(&data[28..32]),
            last_pgno: endian.read_u32(&data[32..36]),
            key_count: endian.read_u32(&data[40..44]),
            record_count: endian.read_u32(&data[44..48]),
            flags: endian.read_u32(&data[48..52]),
            endian,
        };

        header.validate(method)?;
        Ok(header)
    }

    fn validate(&self, method: AccessMethod) -> Result<(), ProbeError> {
        let corrupt = |reason: String| ProbeError::Corrupt { method, reason };
        let unsupported = |reason: String| ProbeError::Unsupported { method, reason };

        if self.page_type != method.meta_page_type() {
            return Err(corrupt(format!(
                "metadata page has type {:?}",
                self.page_type
            )));
        }
        if !(MIN_VERSION..=MAX_VERSION).contains(&self.version) {
            return Err(unsupported(format!("format version {}", self.version)));
        }
        if !PageLayout::is_valid_page_size(self.page_size) {
            return Err(corrupt(format!("bad page size {}", self.page_size)));
        }
        if self.encrypt_alg != 0 {
            return Err(unsupported("file is encrypted".to_string()));
        }
        if self
            .meta_flags
            .intersects(MetaFlags::PART_RANGE | MetaFlags::PART_CALLBACK)
        {
            return Err(unsupported("database is partitioned".to_string()));
        }
        Ok(())
    }

    /// Page layout for the rest of the file
    pub fn layout(&self) -> PageLayout {
        PageLayout::new(
            self.page_size,
            self.endian,
            self.meta_flags.contains(MetaFlags::CHECKSUM),
        )
    }
}

/// Byte order in which the magic at offset 12 equals `magic`
pub fn detect_endian(data: &[u8], magic: u32) -> Option<Endian> {
    let raw = data.get(MAGIC_OFFSET..MAGIC_OFFSET + 4)?;
    [Endian::Little, Endian::Big]
        .into_iter()
        .find(|endian| endian.read_u32(raw) == magic)
}

/// Btree metadata page
#[derive(Debug, Clone)]
pub struct BtreeMeta {
    pub header: MetaHeader,
    pub flags: BtreeFlags,
    pub minkey: u32,
    /// Root page of the main tree
    pub root: u32,
}

impl BtreeMeta {
    /// Page the tree root lives on when the metadata leaves it unset
    pub const DEFAULT_ROOT: u32 = 1;

    pub fn from_bytes(data: &[u8]) -> Result<Self, ProbeError> {
        let method = AccessMethod::Btree;
        let header = MetaHeader::from_bytes(data, method)?;
        let endian = header.endian;
        let flags = BtreeFlags::from_bits_retain(header.flags);

        if flags.contains(BtreeFlags::RECNO) {
            return Err(ProbeError::Unsupported {
                method,
                reason: "record-number (recno) database".to_string(),
            });
        }
        if flags.contains(BtreeFlags::COMPRESS) {
            return Err(ProbeError::Unsupported {
                method,
                reason: "compressed btree".to_string(),
            });
        }

        let root = match endian.read_u32(&data[88..92]) {
            0 => Self::DEFAULT_ROOT,
            root => root,
        };

        Ok(BtreeMeta {
            minkey: endian.read_u32(&data[76..80]),
            header,
            flags,
            root,
        })
    }
}

/// Hash metadata page
#[derive(Debug, Clone)]
pub struct HashMeta {
    pub header: MetaHeader,
    pub flags: HashFlags,
    /// Highest bucket number in use
    pub max_bucket: u32,
    pub high_mask: u32,
    pub low_mask: u32,
    pub ffactor: u32,
    /// Number of keys stored
    pub nelem: u32,
    /// Page offsets of each doubling of the bucket table
    pub spares: [u32; NCACHED],
}

impl HashMeta {
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProbeError> {
        let method = AccessMethod::Hash;
        let header = MetaHeader::from_bytes(data, method)?;
        let endian = header.endian;

        let mut spares = [0u32; NCACHED];
        for (i, spare) in spares.iter_mut().enumerate() {
            let offset = SPARES_OFFSET + i * 4;
            *spare = endian.read_u32(&data[offset..offset + 4]);
        }

        let meta = HashMeta {
            flags: HashFlags::from_bits_retain(header.flags),
            max_bucket: endian.read_u32(&data[72..76]),
            high_mask: endian.read_u32(&data[76..80]),
            low_mask: endian.read_u32(&data[80..84]),
            ffactor: endian.read_u32(&data[84..88]),
            nelem: endian.read_u32(&data[88..92]),
            header,
            spares,
        };

        if meta.max_bucket > meta.high_mask {
            return Err(ProbeError::Corrupt {
                method,
                reason: format!(
                    "max bucket {} exceeds high mask {:#x}",
                    meta.max_bucket, meta.high_mask
                ),
            });
        }
        if ceil_log2(meta.max_bucket as u64 + 1) as usize >= NCACHED {
            return Err(ProbeError::Corrupt {
                method,
                reason: format!("max bucket {} out of range", meta.max_bucket),
            });
        }

        Ok(meta)
    }

    /// Page holding the first page of `bucket`
    pub fn bucket_page(&self, bucket: u32) -> Option<u32> {
        let spare = *self.spares.get(ceil_log2(bucket as u64 + 1) as usize)?;
        bucket.checked_add(spare)
    }
}

/// Smallest `i` with `2^i >= n`
pub fn ceil_log2(n: u64) -> u32 {
    n.max(1).next_power_of_two().trailing_zeros()
}
