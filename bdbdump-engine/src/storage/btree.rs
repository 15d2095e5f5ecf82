//! Btree traversal
//!
//! Records of a btree database live on leaf pages linked left to right
//! through `next_pgno`. A walk starts at the leftmost leaf, found by
//! following the first child of each internal node down from the root, and
//! therefore yields records in ascending byte-wise key order.
//!
//! Off-page duplicate trees have the same shape (internal nodes over linked
//! leaves) but their leaves hold only data items, one per duplicate.

use std::io::{Read, Seek};

use crate::error::{StorageError, StorageResult};

use super::page::{Page, PageBudget, PageIO, PageType};
use super::record::{btree_item, internal_child, resolve, ItemRef, Record};

const INTERNAL_TYPES: &[PageType] = &[PageType::BtreeInternal, PageType::RecnoInternal];
const LEAF_TYPES: &[PageType] = &[PageType::BtreeLeaf];
const DUPLICATE_LEAF_TYPES: &[PageType] = &[PageType::DuplicateLeaf, PageType::RecnoLeaf];

/// Follow first children from `root` down to a leaf
fn leftmost_leaf<R: Read + Seek>(
    io: &mut PageIO<R>,
    root: u32,
    leaf_types: &[PageType],
    budget: &mut PageBudget,
) -> StorageResult<Page> {
    let mut pgno = root;
    loop {
        budget.visit(pgno)?;
        let page = io.read_page(pgno)?;

        if leaf_types.contains(&page.page_type()) {
            page.expect_type(leaf_types)?;
            return Ok(page);
        }

        page.expect_type(INTERNAL_TYPES)?;
        if page.entries() == 0 {
            return Err(StorageError::corrupt(pgno, "internal page has no children"));
        }
        pgno = internal_child(&page, 0)?;
        tracing::trace!(from = page.pgno, to = pgno, "descend");
    }
}

enum Walk {
    NotStarted,
    Page { page: Page, index: u16 },
    Done,
}

/// Position within a chain of leaf pages
struct LeafWalk {
    root: u32,
    leaf_types: &'static [PageType],
    state: Walk,
    budget: PageBudget,
}

impl LeafWalk {
    fn new(root: u32, leaf_types: &'static [PageType], page_count: u32) -> Self {
        LeafWalk {
            root,
            leaf_types,
            state: Walk::NotStarted,
            budget: PageBudget::new(page_count),
        }
    }

    /// Claim the next `step` index slots, returning the page and first slot
    fn next_slot<R: Read + Seek>(
        &mut self,
        io: &mut PageIO<R>,
        step: u16,
    ) -> StorageResult<Option<(&Page, u16)>> {
        if let Walk::NotStarted = self.state {
            let page = leftmost_leaf(io, self.root, self.leaf_types, &mut self.budget)?;
            self.state = Walk::Page { page, index: 0 };
        }

        loop {
            let next = match &self.state {
                Walk::Page { page, index } if *index >= page.entries() => page.header.next_pgno,
                Walk::Page { .. } => break,
                Walk::NotStarted | Walk::Done => return Ok(None),
            };

            if next == 0 {
                self.state = Walk::Done;
                return Ok(None);
            }
            self.budget.visit(next)?;
            let page = io.read_page(next)?;
            page.expect_type(self.leaf_types)?;
            self.state = Walk::Page { page, index: 0 };
        }

        let Walk::Page { page, index } = &mut self.state else {
            return Ok(None);
        };
        let slot = *index;
        if slot as u32 + step as u32 > page.entries() as u32 {
            return Err(StorageError::corrupt(
                page.pgno,
                format!("{} entries do not form whole items", page.entries()),
            ));
        }
        *index += step;
        Ok(Some((&*page, slot)))
    }
}

/// Walks the data items of an off-page duplicate tree
pub struct DuplicateCursor {
    walk: LeafWalk,
}

impl DuplicateCursor {
    pub fn new(root: u32, page_count: u32) -> Self {
        DuplicateCursor {
            walk: LeafWalk::new(root, DUPLICATE_LEAF_TYPES, page_count),
        }
    }

    /// Next duplicate value, in stored order
    pub fn next_value<R: Read + Seek>(
        &mut self,
        io: &mut PageIO<R>,
    ) -> StorageResult<Option<Vec<u8>>> {
        loop {
            let Some((page, slot)) = self.walk.next_slot(io, 1)? else {
                return Ok(None);
            };
            let item = btree_item(page, slot)?;
            if item.deleted {
                continue;
            }
            let pgno = page.pgno;
            return match item.item {
                ItemRef::DuplicateTree { .. } | ItemRef::DuplicateSet(_) => Err(
                    StorageError::corrupt(pgno, "nested duplicate tree"),
                ),
                ref value => resolve(io, pgno, value).map(Some),
            };
        }
    }
}

/// Iterates the records of a btree database in key order
pub struct BtreeCursor {
    walk: LeafWalk,
    pending: Option<(Vec<u8>, DuplicateCursor)>,
}

impl BtreeCursor {
    pub fn new(root: u32, page_count: u32) -> Self {
        BtreeCursor {
            walk: LeafWalk::new(root, LEAF_TYPES, page_count),
            pending: None,
        }
    }

    pub fn next_record<R: Read + Seek>(
        &mut self,
        io: &mut PageIO<R>,
    ) -> StorageResult<Option<Record>> {
        loop {
            if let Some((key, duplicates)) = self.pending.as_mut() {
                if let Some(value) = duplicates.next_value(io)? {
                    return Ok(Some(Record::new(key.clone(), value)));
                }
                self.pending = None;
            }

            let Some((page, slot)) = self.walk.next_slot(io, 2)? else {
                return Ok(None);
            };
            let key_item = btree_item(page, slot)?;
            let data_item = btree_item(page, slot + 1)?;
            if key_item.deleted || data_item.deleted {
                continue;
            }

            let pgno = page.pgno;
            let key = resolve(io, pgno, &key_item.item)?;
            match data_item.item {
                ItemRef::DuplicateTree { pgno: root } => {
                    self.pending = Some((key, DuplicateCursor::new(root, io.page_count())));
                }
                ref value => {
                    let value = resolve(io, pgno, value)?;
                    return Ok(Some(Record::new(key, value)));
                }
            }
        }
    }
}
