//! Records and the on-page items they are stored as
//!
//! A record is a key item and a data item stored at consecutive index slots
//! of a hash or btree leaf page. An item either holds its bytes inline or
//! refers to other pages: an overflow chain for large items, or a tree of
//! duplicate data items.

use std::collections::VecDeque;
use std::io::{Read, Seek};

use crate::error::{StorageError, StorageResult};

use super::page::{Page, PageBudget, PageIO, PageType};

/// Hash item: inline key or data
pub const H_KEYDATA: u8 = 1;
/// Hash item: on-page set of duplicate data items
pub const H_DUPLICATE: u8 = 2;
/// Hash item: reference to an overflow chain
pub const H_OFFPAGE: u8 = 3;
/// Hash item: reference to an off-page duplicate tree
pub const H_OFFDUP: u8 = 4;
/// Hash item: external blob file
pub const H_BLOB: u8 = 5;

/// Btree item: inline key or data
pub const B_KEYDATA: u8 = 1;
/// Btree item: reference to an off-page duplicate tree
pub const B_DUPLICATE: u8 = 2;
/// Btree item: reference to an overflow chain
pub const B_OVERFLOW: u8 = 3;
/// Btree item: external blob file
pub const B_BLOB: u8 = 4;

bitflags::bitflags! {
    /// Flag bits sharing the btree item type byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ItemFlags: u8 {
        /// Item was deleted but not yet reclaimed
        const DELETED = 0x80;
    }
}

/// A key/value pair read from the database
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Record {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Where an item's bytes live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemRef<'a> {
    /// Bytes stored on the page
    Inline(&'a [u8]),
    /// Bytes stored on an overflow page chain
    Overflow { pgno: u32, len: u32 },
    /// Encoded on-page duplicate set
    DuplicateSet(&'a [u8]),
    /// Root page of an off-page duplicate tree
    DuplicateTree { pgno: u32 },
}

/// Decode item `index` of a hash page
///
/// Hash items are packed from the end of the page downwards, so an item runs
/// up to the start of the previous item (or the page end for item 0).
pub fn hash_item(page: &Page, index: u16) -> StorageResult<ItemRef<'_>> {
    let start = page.item_offset(index)?;
    let end = if index == 0 {
        page.layout.page_size as usize
    } else {
        page.item_offset(index - 1)?
    };
    if end <= start {
        return Err(StorageError::corrupt(
            page.pgno,
            format!("hash item {} has no bytes", index),
        ));
    }

    let bytes = page.slice(start, end - start)?;
    match bytes[0] {
        H_KEYDATA => Ok(ItemRef::Inline(&bytes[1..])),
        H_DUPLICATE => Ok(ItemRef::DuplicateSet(&bytes[1..])),
        H_OFFPAGE => Ok(ItemRef::Overflow {
            pgno: page.u32_at(start + 4)?,
            len: page.u32_at(start + 8)?,
        }),
        H_OFFDUP => Ok(ItemRef::DuplicateTree {
            pgno: page.u32_at(start + 4)?,
        }),
        H_BLOB => Err(StorageError::unsupported(
            page.pgno,
            "external blob items are not supported",
        )),
        other => Err(StorageError::corrupt(
            page.pgno,
            format!("hash item {} has unknown type {}", index, other),
        )),
    }
}

/// A decoded btree item and its delete flag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtreeItem<'a> {
    pub item: ItemRef<'a>,
    pub deleted: bool,
}

/// Decode item `index` of a btree leaf or duplicate page
///
/// Inline items are `len: u16, type: u8, data[len]`; overflow and duplicate
/// references are `unused: u16, type: u8, unused: u8, pgno: u32, tlen: u32`.
pub fn btree_item(page: &Page, index: u16) -> StorageResult<BtreeItem<'_>> {
    let offset = page.item_offset(index)?;
    let type_byte = page.slice(offset + 2, 1)?[0];
    let flags = ItemFlags::from_bits_truncate(type_byte);
    let deleted = flags.contains(ItemFlags::DELETED);

    let item = match type_byte & !ItemFlags::DELETED.bits() {
        B_KEYDATA => {
            let len = page.u16_at(offset)? as usize;
            ItemRef::Inline(page.slice(offset + 3, len)?)
        }
        B_OVERFLOW => ItemRef::Overflow {
            pgno: page.u32_at(offset + 4)?,
            len: page.u32_at(offset + 8)?,
        },
        B_DUPLICATE => ItemRef::DuplicateTree {
            pgno: page.u32_at(offset + 4)?,
        },
        B_BLOB => {
            return Err(StorageError::unsupported(
                page.pgno,
                "external blob items are not supported",
            ))
        }
        other => {
            return Err(StorageError::corrupt(
                page.pgno,
                format!("btree item {} has unknown type {}", index, other),
            ))
        }
    };

    Ok(BtreeItem { item, deleted })
}

/// Child page referenced by entry `index` of an internal page
pub fn internal_child(page: &Page, index: u16) -> StorageResult<u32> {
    let offset = page.item_offset(index)?;
    match page.page_type() {
        // BINTERNAL: len, type, unused, pgno, nrecs, data
        PageType::BtreeInternal => page.u32_at(offset + 4),
        // RINTERNAL: pgno, nrecs
        PageType::RecnoInternal => page.u32_at(offset),
        other => Err(StorageError::corrupt(
            page.pgno,
            format!("{:?} page is not an internal node", other),
        )),
    }
}

/// Read `len` bytes from the overflow chain starting at `pgno`
pub fn read_overflow<R: Read + Seek>(
    io: &mut PageIO<R>,
    pgno: u32,
    len: u32,
) -> StorageResult<Vec<u8>> {
    let len = len as usize;
    let bound = io.page_count() as usize * io.layout().page_size as usize;
    let mut out = Vec::with_capacity(len.min(bound));
    let mut budget = PageBudget::new(io.page_count());
    let mut next = pgno;

    while out.len() < len {
        if next == 0 {
            return Err(StorageError::corrupt(
                pgno,
                format!("overflow chain ends after {} of {} bytes", out.len(), len),
            ));
        }
        budget.visit(next)?;

        let page = io.read_page(next)?;
        page.expect_type(&[PageType::Overflow])?;

        let stored = page.header.hf_offset as usize;
        let take = stored.min(len - out.len());
        out.extend_from_slice(page.slice(page.layout.index_offset, take)?);
        next = page.header.next_pgno;
    }

    Ok(out)
}

/// Materialize an item that holds a single key or value
pub fn resolve<R: Read + Seek>(
    io: &mut PageIO<R>,
    pgno: u32,
    item: &ItemRef<'_>,
) -> StorageResult<Vec<u8>> {
    match *item {
        ItemRef::Inline(bytes) => Ok(bytes.to_vec()),
        ItemRef::Overflow { pgno, len } => read_overflow(io, pgno, len),
        ItemRef::DuplicateSet(_) | ItemRef::DuplicateTree { .. } => Err(StorageError::corrupt(
            pgno,
            "duplicate set found where a single item was expected",
        )),
    }
}

/// Split an on-page duplicate set into its values
///
/// The set is a sequence of `len: u16, data[len], len: u16` entries.
pub fn duplicate_set(page: &Page, raw: &[u8]) -> StorageResult<VecDeque<Vec<u8>>> {
    let endian = page.layout.endian;
    let mut values = VecDeque::new();
    let mut pos = 0;

    while pos < raw.len() {
        let corrupt = || StorageError::corrupt(page.pgno, "truncated duplicate set");
        let head = raw.get(pos..pos + 2).ok_or_else(corrupt)?;
        let len = endian.read_u16(head) as usize;
        let data = raw.get(pos + 2..pos + 2 + len).ok_or_else(corrupt)?;
        let tail = raw.get(pos + 2 + len..pos + 4 + len).ok_or_else(corrupt)?;
        if endian.read_u16(tail) as usize != len {
            return Err(StorageError::corrupt(
                page.pgno,
                "duplicate set length markers disagree",
            ));
        }
        values.push_back(data.to_vec());
        pos += len + 4;
    }

    Ok(values)
}
