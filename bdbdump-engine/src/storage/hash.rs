//! Hash table traversal
//!
//! A hash database enumerates bucket by bucket, from bucket 0 up to
//! `max_bucket`. Each bucket is a primary page plus a chain of overflow
//! bucket pages linked through `next_pgno`; within a page, records are the
//! key/data item pairs in index order. The order is whatever the hash
//! function produced and is not sorted.

use std::collections::VecDeque;
use std::io::{Read, Seek};

use crate::error::{StorageError, StorageResult};

use super::btree::DuplicateCursor;
use super::meta::HashMeta;
use super::page::{Page, PageBudget, PageIO, PageType};
use super::record::{duplicate_set, hash_item, resolve, ItemRef, Record};

const HASH_PAGE_TYPES: &[PageType] = &[PageType::Hash, PageType::HashUnsorted];

/// Remaining values of a duplicate set whose key was already read
enum Pending {
    None,
    Set {
        key: Vec<u8>,
        values: VecDeque<Vec<u8>>,
    },
    Tree {
        key: Vec<u8>,
        cursor: DuplicateCursor,
    },
}

/// Iterates the records of a hash database in bucket order
pub struct HashCursor {
    meta: HashMeta,
    /// Next bucket to open
    bucket: u32,
    /// Current page and next index slot on it
    page: Option<(Page, u16)>,
    budget: PageBudget,
    pending: Pending,
}

impl HashCursor {
    pub fn new(meta: HashMeta, page_count: u32) -> Self {
        HashCursor {
            meta,
            bucket: 0,
            page: None,
            budget: PageBudget::new(page_count),
            pending: Pending::None,
        }
    }

    pub fn next_record<R: Read + Seek>(
        &mut self,
        io: &mut PageIO<R>,
    ) -> StorageResult<Option<Record>> {
        loop {
            match &mut self.pending {
                Pending::Set { key, values } => {
                    if let Some(value) = values.pop_front() {
                        return Ok(Some(Record::new(key.clone(), value)));
                    }
                }
                Pending::Tree { key, cursor } => {
                    if let Some(value) = cursor.next_value(io)? {
                        return Ok(Some(Record::new(key.clone(), value)));
                    }
                }
                Pending::None => {}
            }
            self.pending = Pending::None;

            let Some(slot) = self.advance(io)? else {
                return Ok(None);
            };
            let Some((page, _)) = self.page.as_ref() else {
                return Ok(None);
            };

            let key = resolve(io, page.pgno, &hash_item(page, slot)?)?;
            match hash_item(page, slot + 1)? {
                ItemRef::DuplicateSet(raw) => {
                    let values = duplicate_set(page, raw)?;
                    self.pending = Pending::Set { key, values };
                }
                ItemRef::DuplicateTree { pgno } => {
                    let cursor = DuplicateCursor::new(pgno, io.page_count());
                    self.pending = Pending::Tree { key, cursor };
                }
                item => {
                    let value = resolve(io, page.pgno, &item)?;
                    return Ok(Some(Record::new(key, value)));
                }
            }
        }
    }

    /// Move to the next key/data pair, opening pages as needed
    fn advance<R: Read + Seek>(&mut self, io: &mut PageIO<R>) -> StorageResult<Option<u16>> {
        loop {
            if let Some((page, index)) = &mut self.page {
                if *index < page.entries() {
                    let slot = *index;
                    if slot + 1 >= page.entries() {
                        return Err(StorageError::corrupt(
                            page.pgno,
                            format!("{} entries do not form key/data pairs", page.entries()),
                        ));
                    }
                    *index += 2;
                    return Ok(Some(slot));
                }

                let next = page.header.next_pgno;
                if next != 0 {
                    self.budget.visit(next)?;
                    let page = io.read_page(next)?;
                    page.expect_type(HASH_PAGE_TYPES)?;
                    self.page = Some((page, 0));
                    continue;
                }
                self.page = None;
            }

            if self.bucket > self.meta.max_bucket {
                return Ok(None);
            }
            let bucket = self.bucket;
            self.bucket += 1;

            let pgno = self.meta.bucket_page(bucket).ok_or_else(|| {
                StorageError::corrupt(0, format!("bucket {} maps past the last page", bucket))
            })?;
            self.budget.visit(pgno)?;
            let page = io.read_page(pgno)?;
            if page.is_unused() {
                tracing::trace!(bucket, pgno, "bucket page never initialized");
                continue;
            }
            page.expect_type(HASH_PAGE_TYPES)?;
            tracing::trace!(bucket, pgno, entries = page.entries(), "open bucket");
            self.page = Some((page, 0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::fixtures::{inline, overflow, page_type_offset, ImageBuilder, Item, PAGE_SIZE};
    use std::io::Cursor;

    fn collect(image: Vec<u8>) -> StorageResult<Vec<Record>> {
        let meta = HashMeta::from_bytes(&image).unwrap();
        let mut io = PageIO::new(Cursor::new(image), meta.header.layout()).unwrap();
        let mut cursor = HashCursor::new(meta, io.page_count());
        let mut records = Vec::new();
        while let Some(record) = cursor.next_record(&mut io)? {
            records.push(record);
        }
        Ok(records)
    }

    fn keys(records: &[Record]) -> Vec<&[u8]> {
        records.iter().map(|r| r.key.as_slice()).collect()
    }

    #[test]
    fn test_bucket_order_not_sorted() {
        let image = ImageBuilder::new().hash(&[
            vec![(inline(b"zeta"), inline(b"1"))],
            vec![],
            vec![(inline(b"alpha"), inline(b"2")), (inline(b"mid"), inline(b"3"))],
        ]);

        let records = collect(image).unwrap();
        assert_eq!(keys(&records), vec![&b"zeta"[..], &b"alpha"[..], &b"mid"[..]]);
        assert_eq!(records[0].value, b"1");
    }

    #[test]
    fn test_bucket_chain_pages() {
        let pairs: Vec<_> = (0u8..7)
            .map(|i| (inline(&[b'k', i]), inline(&[i; 3])))
            .collect();
        let image = ImageBuilder::new()
            .pairs_per_page(2)
            .hash(&[pairs, vec![(inline(b"last"), inline(b""))]]);

        let records = collect(image).unwrap();
        assert_eq!(records.len(), 8);
        for (i, record) in records.iter().take(7).enumerate() {
            assert_eq!(record.key, vec![b'k', i as u8]);
            assert_eq!(record.value, vec![i as u8; 3]);
        }
        assert_eq!(records[7], Record::new(&b"last"[..], Vec::new()));
    }

    #[test]
    fn test_duplicates_and_overflow() {
        let big = vec![0xFF; 1200];
        let mid = vec![0xEE; 300];
        let image = ImageBuilder::new().hash(&[vec![
            (inline(b"set"), Item::Dups(vec![b"a".to_vec(), b"b".to_vec()])),
            (inline(b"tree"), Item::OffPageDups(vec![b"c".to_vec(), mid.clone()])),
            (overflow(&big), inline(b"d")),
        ]]);

        let records = collect(image).unwrap();
        assert_eq!(
            records,
            vec![
                Record::new(&b"set"[..], &b"a"[..]),
                Record::new(&b"set"[..], &b"b"[..]),
                Record::new(&b"tree"[..], &b"c"[..]),
                Record::new(&b"tree"[..], mid),
                Record::new(big, &b"d"[..]),
            ]
        );
    }

    #[test]
    fn test_unused_bucket_page_is_empty() {
        let mut image = ImageBuilder::new().hash(&[
            vec![(inline(b"a"), inline(b"1"))],
            vec![(inline(b"b"), inline(b"2"))],
        ]);
        // Zero out bucket 0's page
        image[PAGE_SIZE..2 * PAGE_SIZE].fill(0);

        let records = collect(image).unwrap();
        assert_eq!(keys(&records), vec![&b"b"[..]]);
    }

    #[test]
    fn test_big_endian() {
        let image = ImageBuilder::new().big_endian().hash(&[
            vec![(inline(&[0x00, 0xFF]), inline(&[0x41]))],
            vec![(inline(b"x"), Item::Dups(vec![b"1".to_vec(), b"22".to_vec()]))],
        ]);

        let records = collect(image).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].value, b"22");
    }

    #[test]
    fn test_wrong_page_type_in_bucket() {
        let mut image = ImageBuilder::new().hash(&[vec![], vec![(inline(b"a"), inline(b"1"))]]);
        image[page_type_offset(2)] = PageType::BtreeLeaf as u8;

        let err = collect(image).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { pgno: 2, .. }));
    }
}
