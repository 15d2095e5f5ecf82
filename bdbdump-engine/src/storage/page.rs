//! Page I/O and page structure definitions for Berkeley DB files
//!
//! Every database file is an array of fixed-size pages. The page size and the
//! byte order the file was written in are taken from the metadata page
//! (page 0); every other page starts with the same 26-byte header:
//!
//! ```text
//! 00-07  LSN
//! 08-11  pgno
//! 12-15  prev_pgno
//! 16-19  next_pgno
//! 20-21  entries
//! 22-23  hf_offset
//! 24     level
//! 25     type
//! ```
//!
//! The item index array (`entries` x u16 offsets) follows the header, after a
//! 6-byte checksum area when the file was created with page checksums.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::io::{self, Read, Seek, SeekFrom};

use crate::error::{StorageError, StorageResult};

/// Smallest page size Berkeley DB will create
pub const MIN_PAGE_SIZE: u32 = 512;

/// Largest page size Berkeley DB will create
pub const MAX_PAGE_SIZE: u32 = 65536;

/// Size of the generic page header
pub const PAGE_HEADER_SIZE: usize = 26;

/// Extra header bytes on pages of checksummed files
pub const CHECKSUM_AREA_SIZE: usize = 6;

/// Byte order the file was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    /// Read a u16; `buf` must hold at least 2 bytes
    pub fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(buf),
            Endian::Big => BigEndian::read_u16(buf),
        }
    }

    /// Read a u32; `buf` must hold at least 4 bytes
    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(buf),
            Endian::Big => BigEndian::read_u32(buf),
        }
    }
}

/// Page type identifiers (byte 25 of every page)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    /// Never initialized or freed
    Invalid = 0,
    /// Obsolete duplicate page
    Duplicate = 1,
    /// Hash page written before sorted hash pages existed
    HashUnsorted = 2,
    /// Btree internal node
    BtreeInternal = 3,
    /// Recno internal node
    RecnoInternal = 4,
    /// Btree leaf
    BtreeLeaf = 5,
    /// Recno leaf
    RecnoLeaf = 6,
    /// Overflow page holding part of a large item
    Overflow = 7,
    /// Hash metadata page
    HashMeta = 8,
    /// Btree metadata page
    BtreeMeta = 9,
    /// Queue metadata page
    QueueMeta = 10,
    /// Queue data page
    QueueData = 11,
    /// Off-page duplicate tree leaf
    DuplicateLeaf = 12,
    /// Hash bucket page
    Hash = 13,
    /// Anything else
    Unknown = 0xFF,
}

impl From<u8> for PageType {
    fn from(value: u8) -> Self {
        match value {
            0 => PageType::Invalid,
            1 => PageType::Duplicate,
            2 => PageType::HashUnsorted,
            3 => PageType::BtreeInternal,
            4 => PageType::RecnoInternal,
            5 => PageType::BtreeLeaf,
            6 => PageType::RecnoLeaf,
            7 => PageType::Overflow,
            8 => PageType::HashMeta,
            9 => PageType::BtreeMeta,
            10 => PageType::QueueMeta,
            11 => PageType::QueueData,
            12 => PageType::DuplicateLeaf,
            13 => PageType::Hash,
            _ => PageType::Unknown,
        }
    }
}

/// How pages of one file are decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    pub page_size: u32,
    pub endian: Endian,
    /// Offset of the item index array within a page
    pub index_offset: usize,
}

impl PageLayout {
    pub fn new(page_size: u32, endian: Endian, checksummed: bool) -> Self {
        let index_offset = if checksummed {
            PAGE_HEADER_SIZE + CHECKSUM_AREA_SIZE
        } else {
            PAGE_HEADER_SIZE
        };
        PageLayout {
            page_size,
            endian,
            index_offset,
        }
    }

    /// True for the power-of-two sizes Berkeley DB supports
    pub fn is_valid_page_size(page_size: u32) -> bool {
        page_size.is_power_of_two() && (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size)
    }
}

/// Common page header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHeader {
    pub pgno: u32,
    pub prev_pgno: u32,
    pub next_pgno: u32,
    /// Number of item index slots in use
    pub entries: u16,
    /// Item data start (bucket/leaf pages) or byte count (overflow pages)
    pub hf_offset: u16,
    pub level: u8,
    pub page_type: PageType,
}

impl PageHeader {
    /// Read a page header from bytes
    pub fn from_bytes(data: &[u8], endian: Endian) -> io::Result<Self> {
        if data.len() < PAGE_HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Page header too short",
            ));
        }

        Ok(PageHeader {
            pgno: endian.read_u32(&data[8..12]),
            prev_pgno: endian.read_u32(&data[12..16]),
            next_pgno: endian.read_u32(&data[16..20]),
            entries: endian.read_u16(&data[20..22]),
            hf_offset: endian.read_u16(&data[22..24]),
            level: data[24],
            page_type: PageType::from(data[25]),
        })
    }
}

/// One page read from the file
#[derive(Clone)]
pub struct Page {
    /// Page number the page was read from
    pub pgno: u32,
    pub header: PageHeader,
    pub layout: PageLayout,
    /// Raw page data
    pub data: Vec<u8>,
}

impl Page {
    /// Wrap raw page data, decoding its header
    pub fn from_data(pgno: u32, data: Vec<u8>, layout: PageLayout) -> StorageResult<Self> {
        let header = PageHeader::from_bytes(&data, layout.endian)
            .map_err(|source| StorageError::Io { pgno, source })?;
        Ok(Page {
            pgno,
            header,
            layout,
            data,
        })
    }

    pub fn page_type(&self) -> PageType {
        self.header.page_type
    }

    pub fn entries(&self) -> u16 {
        self.header.entries
    }

    /// A zero-filled page that was allocated but never written
    pub fn is_unused(&self) -> bool {
        self.header.page_type == PageType::Invalid
            && self.header.pgno == 0
            && self.header.entries == 0
    }

    /// Check the page is one of `expected` and really is page `self.pgno`
    pub fn expect_type(&self, expected: &[PageType]) -> StorageResult<()> {
        if !expected.contains(&self.header.page_type) {
            return Err(StorageError::corrupt(
                self.pgno,
                format!(
                    "expected {:?} page, found {:?}",
                    expected, self.header.page_type
                ),
            ));
        }
        if self.header.pgno != self.pgno {
            return Err(StorageError::corrupt(
                self.pgno,
                format!("page header claims page number {}", self.header.pgno),
            ));
        }
        Ok(())
    }

    /// Byte offset of item `index`, validated against the page bounds
    pub fn item_offset(&self, index: u16) -> StorageResult<usize> {
        if index >= self.header.entries {
            return Err(StorageError::corrupt(
                self.pgno,
                format!("item {} out of range ({} entries)", index, self.header.entries),
            ));
        }
        let slot = self.layout.index_offset + 2 * index as usize;
        let offset = self.u16_at(slot)? as usize;
        if offset < self.layout.index_offset || offset >= self.data.len() {
            return Err(StorageError::corrupt(
                self.pgno,
                format!("item {} offset {} outside page", index, offset),
            ));
        }
        Ok(offset)
    }

    /// Bounds-checked slice of the page
    pub fn slice(&self, start: usize, len: usize) -> StorageResult<&[u8]> {
        start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| {
                StorageError::corrupt(
                    self.pgno,
                    format!("{} bytes at offset {} run past end of page", len, start),
                )
            })
    }

    pub fn u16_at(&self, offset: usize) -> StorageResult<u16> {
        Ok(self.layout.endian.read_u16(self.slice(offset, 2)?))
    }

    pub fn u32_at(&self, offset: usize) -> StorageResult<u32> {
        Ok(self.layout.endian.read_u32(self.slice(offset, 4)?))
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("pgno", &self.pgno)
            .field("page_type", &self.header.page_type)
            .field("entries", &self.header.entries)
            .field("next_pgno", &self.header.next_pgno)
            .finish()
    }
}

/// Read-only page access on a database file
pub struct PageIO<R> {
    reader: R,
    layout: PageLayout,
    page_count: u32,
}

impl<R: Read + Seek> PageIO<R> {
    /// Wrap a reader; the number of whole pages is taken from its length
    pub fn new(mut reader: R, layout: PageLayout) -> io::Result<Self> {
        let end = reader.seek(SeekFrom::End(0))?;
        let page_count = (end / layout.page_size as u64).min(u32::MAX as u64) as u32;
        Ok(PageIO {
            reader,
            layout,
            page_count,
        })
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    /// Number of whole pages in the file
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Read a page from the file
    pub fn read_page(&mut self, pgno: u32) -> StorageResult<Page> {
        if pgno >= self.page_count {
            return Err(StorageError::corrupt(
                pgno,
                format!("page is beyond end of file ({} pages)", self.page_count),
            ));
        }

        let offset = pgno as u64 * self.layout.page_size as u64;
        let mut data = vec![0u8; self.layout.page_size as usize];
        self.reader
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.reader.read_exact(&mut data))
            .map_err(|source| StorageError::Io { pgno, source })?;

        tracing::trace!(pgno, "read page");
        Page::from_data(pgno, data, self.layout)
    }
}

/// Bounds the number of pages one walk may visit so that a cyclic
/// `next_pgno` chain surfaces as corruption instead of an endless loop
#[derive(Debug, Clone)]
pub struct PageBudget {
    remaining: u32,
}

impl PageBudget {
    pub fn new(page_count: u32) -> Self {
        PageBudget {
            remaining: page_count,
        }
    }

    /// Account for a visit to `pgno`
    pub fn visit(&mut self, pgno: u32) -> StorageResult<()> {
        if self.remaining == 0 {
            return Err(StorageError::corrupt(
                pgno,
                "page chain visits more pages than the file holds",
            ));
        }
        self.remaining -= 1;
        Ok(())
    }
}
