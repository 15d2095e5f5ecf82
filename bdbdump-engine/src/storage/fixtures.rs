//! Builders for small hash and btree database images used by tests
//!
//! Images use 512-byte pages and version 9 metadata. Hash images map bucket
//! `b` to page `b + 1`; btree images put the root on page 1, with one
//! internal level when more than one leaf is given.

use std::io::Write;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tempfile::NamedTempFile;

use super::meta::{MetaFlags, BTREE_MAGIC, HASH_MAGIC, NCACHED};
use super::page::{Endian, PageType, CHECKSUM_AREA_SIZE, PAGE_HEADER_SIZE};
use super::record::{
    ItemFlags, B_DUPLICATE, B_KEYDATA, B_OVERFLOW, H_DUPLICATE, H_KEYDATA, H_OFFDUP, H_OFFPAGE,
};

pub const PAGE_SIZE: usize = 512;

/// How a key or value is stored in the image
#[derive(Debug, Clone)]
pub enum Item {
    Inline(Vec<u8>),
    Overflow(Vec<u8>),
    /// Hash: on-page duplicate set. Btree: repeated pairs sharing the key.
    Dups(Vec<Vec<u8>>),
    /// Off-page duplicate tree
    OffPageDups(Vec<Vec<u8>>),
    /// Btree inline item with the delete flag set
    Deleted(Vec<u8>),
}

pub type Pair = (Item, Item);

pub fn inline(bytes: &[u8]) -> Item {
    Item::Inline(bytes.to_vec())
}

pub fn overflow(bytes: &[u8]) -> Item {
    Item::Overflow(bytes.to_vec())
}

/// Write an image to a scratch file
pub fn write_temp(image: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(image).unwrap();
    file.flush().unwrap();
    file
}

/// Byte offset of page `pgno`'s type byte within an image
pub fn page_type_offset(pgno: u32) -> usize {
    pgno as usize * PAGE_SIZE + 25
}

fn put_u16(endian: Endian, buf: &mut [u8], value: u16) {
    match endian {
        Endian::Little => LittleEndian::write_u16(buf, value),
        Endian::Big => BigEndian::write_u16(buf, value),
    }
}

fn put_u32(endian: Endian, buf: &mut [u8], value: u32) {
    match endian {
        Endian::Little => LittleEndian::write_u32(buf, value),
        Endian::Big => BigEndian::write_u32(buf, value),
    }
}

/// Lays out items from the end of a page downwards
struct PageWriter {
    endian: Endian,
    index_offset: usize,
    data: Vec<u8>,
    low: usize,
    entries: u16,
    last_key: u16,
}

impl PageWriter {
    fn push(&mut self, bytes: &[u8]) -> u16 {
        let start = self.low - bytes.len();
        let slot = self.index_offset + 2 * self.entries as usize;
        assert!(start >= slot + 2, "fixture items do not fit in one page");
        self.data[start..self.low].copy_from_slice(bytes);
        self.low = start;
        self.push_index(start as u16);
        start as u16
    }

    fn push_index(&mut self, offset: u16) {
        let slot = self.index_offset + 2 * self.entries as usize;
        put_u16(self.endian, &mut self.data[slot..slot + 2], offset);
        self.entries += 1;
    }

    fn finish(mut self, prev: u32, next: u32) -> Vec<u8> {
        let endian = self.endian;
        put_u32(endian, &mut self.data[12..16], prev);
        put_u32(endian, &mut self.data[16..20], next);
        put_u16(endian, &mut self.data[20..22], self.entries);
        put_u16(endian, &mut self.data[22..24], self.low as u16);
        self.data
    }
}

/// One index slot of a btree leaf
enum Slot {
    Key(Vec<u8>),
    Data(Vec<u8>),
    SameKey,
}

/// Builds a database image page by page
pub struct ImageBuilder {
    endian: Endian,
    checksum: bool,
    pairs_per_page: usize,
    pages: Vec<Vec<u8>>,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageBuilder {
    pub fn new() -> Self {
        ImageBuilder {
            endian: Endian::Little,
            checksum: false,
            pairs_per_page: usize::MAX,
            pages: vec![vec![0; PAGE_SIZE]],
        }
    }

    pub fn big_endian(mut self) -> Self {
        self.endian = Endian::Big;
        self
    }

    pub fn checksummed(mut self) -> Self {
        self.checksum = true;
        self
    }

    /// Spill hash buckets onto chained pages after `n` pairs
    pub fn pairs_per_page(mut self, n: usize) -> Self {
        self.pairs_per_page = n.max(1);
        self
    }

    /// Build a hash database; bucket `b` holds `buckets[b]`
    pub fn hash(mut self, buckets: &[Vec<Pair>]) -> Vec<u8> {
        let nbuckets = buckets.len().max(1);
        for _ in 0..nbuckets {
            self.alloc();
        }

        for bucket in 0..nbuckets {
            let first = bucket as u32 + 1;
            let pairs = buckets.get(bucket).map(Vec::as_slice).unwrap_or(&[]);
            if pairs.is_empty() {
                let page = self.writer(first, PageType::Hash, 0).finish(0, 0);
                self.pages[first as usize] = page;
                continue;
            }

            let chunks: Vec<&[Pair]> = pairs.chunks(self.pairs_per_page).collect();
            let mut pgnos = vec![first];
            for _ in 1..chunks.len() {
                pgnos.push(self.alloc());
            }

            for (i, chunk) in chunks.iter().enumerate() {
                let mut encoded = Vec::new();
                for (key, value) in chunk.iter() {
                    encoded.push(self.hash_bytes(key));
                    encoded.push(self.hash_bytes(value));
                }

                let mut writer = self.writer(pgnos[i], PageType::Hash, 0);
                for bytes in &encoded {
                    writer.push(bytes);
                }
                let prev = if i > 0 { pgnos[i - 1] } else { 0 };
                let next = pgnos.get(i + 1).copied().unwrap_or(0);
                self.pages[pgnos[i] as usize] = writer.finish(prev, next);
            }
        }

        let nelem: usize = buckets.iter().map(Vec::len).sum();
        let high_mask = (nbuckets as u32).next_power_of_two() - 1;
        self.write_meta(HASH_MAGIC, PageType::HashMeta);

        let endian = self.endian;
        let meta = &mut self.pages[0];
        put_u32(endian, &mut meta[72..76], nbuckets as u32 - 1);
        put_u32(endian, &mut meta[76..80], high_mask);
        put_u32(endian, &mut meta[80..84], high_mask >> 1);
        put_u32(endian, &mut meta[84..88], 8);
        put_u32(endian, &mut meta[88..92], nelem as u32);
        for i in 0..NCACHED {
            let offset = 96 + 4 * i;
            put_u32(endian, &mut meta[offset..offset + 4], 1);
        }

        self.finish()
    }

    /// Build a btree database whose leaves, left to right, hold `leaves`
    pub fn btree(mut self, leaves: &[Vec<Pair>]) -> Vec<u8> {
        self.alloc();
        let leaf_pgnos: Vec<u32> = if leaves.len() <= 1 {
            vec![1]
        } else {
            (0..leaves.len()).map(|_| self.alloc()).collect()
        };

        for (i, &pgno) in leaf_pgnos.iter().enumerate() {
            let pairs = leaves.get(i).map(Vec::as_slice).unwrap_or(&[]);
            let mut slots = Vec::new();
            for (key, value) in pairs {
                slots.push(Slot::Key(self.btree_bytes(key)));
                match value {
                    Item::Dups(values) => {
                        for (j, v) in values.iter().enumerate() {
                            if j > 0 {
                                slots.push(Slot::SameKey);
                            }
                            slots.push(Slot::Data(bkeydata(self.endian, v, B_KEYDATA)));
                        }
                    }
                    other => slots.push(Slot::Data(self.btree_bytes(other))),
                }
            }

            let mut writer = self.writer(pgno, PageType::BtreeLeaf, 1);
            for slot in &slots {
                match slot {
                    Slot::Key(bytes) => writer.last_key = writer.push(bytes),
                    Slot::Data(bytes) => {
                        writer.push(bytes);
                    }
                    Slot::SameKey => {
                        let key = writer.last_key;
                        writer.push_index(key);
                    }
                }
            }
            let prev = if i > 0 { leaf_pgnos[i - 1] } else { 0 };
            let next = leaf_pgnos.get(i + 1).copied().unwrap_or(0);
            self.pages[pgno as usize] = writer.finish(prev, next);
        }

        if leaf_pgnos.len() > 1 {
            let mut root = self.writer(1, PageType::BtreeInternal, 2);
            for (i, &child) in leaf_pgnos.iter().enumerate() {
                let separator = match leaves[i].first() {
                    Some((Item::Inline(key), _)) if i > 0 => key.clone(),
                    _ => Vec::new(),
                };
                root.push(&binternal(self.endian, child, &separator));
            }
            self.pages[1] = root.finish(0, 0);
        }

        self.write_meta(BTREE_MAGIC, PageType::BtreeMeta);
        let endian = self.endian;
        let meta = &mut self.pages[0];
        put_u32(endian, &mut meta[76..80], 2);
        put_u32(endian, &mut meta[88..92], 1);

        self.finish()
    }

    fn index_offset(&self) -> usize {
        if self.checksum {
            PAGE_HEADER_SIZE + CHECKSUM_AREA_SIZE
        } else {
            PAGE_HEADER_SIZE
        }
    }

    fn alloc(&mut self) -> u32 {
        self.pages.push(vec![0; PAGE_SIZE]);
        (self.pages.len() - 1) as u32
    }

    fn writer(&self, pgno: u32, page_type: PageType, level: u8) -> PageWriter {
        let mut data = vec![0u8; PAGE_SIZE];
        put_u32(self.endian, &mut data[8..12], pgno);
        data[24] = level;
        data[25] = page_type as u8;
        PageWriter {
            endian: self.endian,
            index_offset: self.index_offset(),
            data,
            low: PAGE_SIZE,
            entries: 0,
            last_key: 0,
        }
    }

    fn overflow_chain(&mut self, bytes: &[u8]) -> u32 {
        let capacity = PAGE_SIZE - self.index_offset();
        let chunks: Vec<&[u8]> = if bytes.is_empty() {
            vec![bytes]
        } else {
            bytes.chunks(capacity).collect()
        };
        let pgnos: Vec<u32> = chunks.iter().map(|_| self.alloc()).collect();

        for (i, chunk) in chunks.iter().enumerate() {
            let mut writer = self.writer(pgnos[i], PageType::Overflow, 0);
            let start = writer.index_offset;
            writer.data[start..start + chunk.len()].copy_from_slice(chunk);
            writer.entries = 1;
            writer.low = chunk.len();
            let prev = if i > 0 { pgnos[i - 1] } else { 0 };
            let next = pgnos.get(i + 1).copied().unwrap_or(0);
            self.pages[pgnos[i] as usize] = writer.finish(prev, next);
        }
        pgnos[0]
    }

    fn duplicate_tree(&mut self, values: &[Vec<u8>]) -> u32 {
        let pgno = self.alloc();
        let mut writer = self.writer(pgno, PageType::DuplicateLeaf, 1);
        for value in values {
            writer.push(&bkeydata(self.endian, value, B_KEYDATA));
        }
        self.pages[pgno as usize] = writer.finish(0, 0);
        pgno
    }

    fn hash_bytes(&mut self, item: &Item) -> Vec<u8> {
        let endian = self.endian;
        match item {
            Item::Inline(bytes) => {
                let mut out = vec![H_KEYDATA];
                out.extend_from_slice(bytes);
                out
            }
            Item::Overflow(bytes) => {
                let pgno = self.overflow_chain(bytes);
                let mut out = vec![H_OFFPAGE, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
                put_u32(endian, &mut out[4..8], pgno);
                put_u32(endian, &mut out[8..12], bytes.len() as u32);
                out
            }
            Item::Dups(values) => {
                let mut out = vec![H_DUPLICATE];
                for value in values {
                    let mut len = [0u8; 2];
                    put_u16(endian, &mut len, value.len() as u16);
                    out.extend_from_slice(&len);
                    out.extend_from_slice(value);
                    out.extend_from_slice(&len);
                }
                out
            }
            Item::OffPageDups(values) => {
                let pgno = self.duplicate_tree(values);
                let mut out = vec![H_OFFDUP, 0, 0, 0, 0, 0, 0, 0];
                put_u32(endian, &mut out[4..8], pgno);
                out
            }
            Item::Deleted(_) => panic!("hash items carry no delete flag"),
        }
    }

    fn btree_bytes(&mut self, item: &Item) -> Vec<u8> {
        let endian = self.endian;
        match item {
            Item::Inline(bytes) => bkeydata(endian, bytes, B_KEYDATA),
            Item::Deleted(bytes) => {
                bkeydata(endian, bytes, B_KEYDATA | ItemFlags::DELETED.bits())
            }
            Item::Overflow(bytes) => {
                let pgno = self.overflow_chain(bytes);
                boverflow(endian, B_OVERFLOW, pgno, bytes.len() as u32)
            }
            Item::OffPageDups(values) => {
                let pgno = self.duplicate_tree(values);
                boverflow(endian, B_DUPLICATE, pgno, 0)
            }
            Item::Dups(_) => panic!("btree on-page duplicates are written as repeated pairs"),
        }
    }

    fn write_meta(&mut self, magic: u32, page_type: PageType) {
        let endian = self.endian;
        let checksum = self.checksum;
        let meta = &mut self.pages[0];
        put_u32(endian, &mut meta[8..12], 0);
        put_u32(endian, &mut meta[12..16], magic);
        put_u32(endian, &mut meta[16..20], 9);
        put_u32(endian, &mut meta[20..24], PAGE_SIZE as u32);
        meta[24] = 0;
        meta[25] = page_type as u8;
        meta[26] = if checksum { MetaFlags::CHECKSUM.bits() } else { 0 };
    }

    fn finish(mut self) -> Vec<u8> {
        let last_pgno = (self.pages.len() - 1) as u32;
        put_u32(self.endian, &mut self.pages[0][32..36], last_pgno);
        self.pages.concat()
    }
}

fn bkeydata(endian: Endian, bytes: &[u8], item_type: u8) -> Vec<u8> {
    let mut out = vec![0u8, 0, item_type];
    put_u16(endian, &mut out[0..2], bytes.len() as u16);
    out.extend_from_slice(bytes);
    out
}

fn boverflow(endian: Endian, item_type: u8, pgno: u32, len: u32) -> Vec<u8> {
    let mut out = vec![0u8; 12];
    out[2] = item_type;
    put_u32(endian, &mut out[4..8], pgno);
    put_u32(endian, &mut out[8..12], len);
    out
}

fn binternal(endian: Endian, child: u32, key: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; 12];
    put_u16(endian, &mut out[0..2], key.len() as u16);
    out[2] = B_KEYDATA;
    put_u32(endian, &mut out[4..8], child);
    out.extend_from_slice(key);
    out
}
