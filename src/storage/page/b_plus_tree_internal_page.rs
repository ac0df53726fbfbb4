//! B+Tree internal node.
//!
//! An internal node stores `size` (key, child) pairs. The key in slot 0 is a
//! placeholder and is never compared: child `i` roots the subtree holding
//! every key `k` with `key[i] <= k < key[i + 1]`.
//!
//! ```text
//! | tree header (29) | KEY(0)+CHILD(0) | KEY(1)+CHILD(1) | ... | KEY(n-1)+CHILD(n-1) |
//! ```

use crate::common::{Error, PageId, Result};
use crate::common::config::PAGE_SIZE;
use crate::index::btree::IndexKey;

use super::b_plus_tree_page::{min_size_for, TreePageHeader};
use super::page::Page;
use super::page_header::PageType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalPage<K: IndexKey> {
    page_id: PageId,
    parent_page_id: PageId,
    max_size: usize,
    entries: Vec<(K, PageId)>,
}

impl<K: IndexKey> InternalPage<K> {
    pub const HEADER_SIZE: usize = TreePageHeader::END;
    const ENTRY_SIZE: usize = K::ENCODED_SIZE + PageId::ENCODED_SIZE;

    /// Most child pointers that fit in one page for this key type.
    pub fn capacity() -> usize {
        (PAGE_SIZE - Self::HEADER_SIZE) / Self::ENTRY_SIZE
    }

    pub fn new(page_id: PageId, parent_page_id: PageId, max_size: usize) -> Self {
        Self {
            page_id,
            parent_page_id,
            max_size,
            entries: Vec::with_capacity(max_size + 1),
        }
    }

    /// A root with exactly two children split by `key`.
    pub fn new_root(
        page_id: PageId,
        max_size: usize,
        left: PageId,
        key: K,
        right: PageId,
    ) -> Self {
        let mut root = Self::new(page_id, PageId::INVALID, max_size);
        root.entries.push((K::default(), left));
        root.entries.push((key, right));
        root
    }

    pub fn decode(page: &Page) -> Result<Self> {
        let header = TreePageHeader::read(page);
        if header.page_type != PageType::BTreeInternal {
            return Err(Error::corrupt(header.page_id.0, "not an internal page"));
        }
        if !page.verify_checksum() {
            return Err(Error::ChecksumMismatch(header.page_id.0));
        }
        let size = header.size as usize;
        if size == 0 {
            return Err(Error::corrupt(header.page_id.0, "internal page without children"));
        }
        if size > Self::capacity() {
            return Err(Error::corrupt(
                header.page_id.0,
                format!("internal size {} exceeds capacity {}", size, Self::capacity()),
            ));
        }

        let data = page.as_slice();
        let mut entries = Vec::with_capacity(header.max_size as usize + 1);
        for i in 0..size {
            let offset = Self::HEADER_SIZE + i * Self::ENTRY_SIZE;
            let key = K::decode(&data[offset..]);
            let child = PageId::decode(&data[offset + K::ENCODED_SIZE..]);
            entries.push((key, child));
        }

        Ok(Self {
            page_id: header.page_id,
            parent_page_id: header.parent_page_id,
            max_size: header.max_size as usize,
            entries,
        })
    }

    /// Serialize into `page`. Callers split before a node outgrows its page.
    pub fn write_to(&self, page: &mut Page) {
        debug_assert!(self.entries.len() <= Self::capacity());

        TreePageHeader {
            page_type: PageType::BTreeInternal,
            size: self.entries.len() as u32,
            max_size: self.max_size as u32,
            parent_page_id: self.parent_page_id,
            page_id: self.page_id,
        }
        .write_to(page);

        let data = page.as_mut_slice();
        for (i, (key, child)) in self.entries.iter().enumerate() {
            let offset = Self::HEADER_SIZE + i * Self::ENTRY_SIZE;
            key.encode(&mut data[offset..]);
            child.encode(&mut data[offset + K::ENCODED_SIZE..]);
        }
        page.stamp_checksum();
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn parent_page_id(&self) -> PageId {
        self.parent_page_id
    }

    pub fn set_parent_page_id(&mut self, parent_page_id: PageId) {
        self.parent_page_id = parent_page_id;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn min_size(&self) -> usize {
        min_size_for(self.max_size)
    }

    pub fn key_at(&self, index: usize) -> K {
        self.entries[index].0
    }

    pub fn set_key_at(&mut self, index: usize, key: K) {
        self.entries[index].0 = key;
    }

    pub fn child_at(&self, index: usize) -> PageId {
        self.entries[index].1
    }

    pub fn children(&self) -> impl Iterator<Item = PageId> + '_ {
        self.entries.iter().map(|&(_, child)| child)
    }

    pub fn child_index(&self, child: PageId) -> Option<usize> {
        self.entries.iter().position(|&(_, c)| c == child)
    }

    /// Index of the child whose subtree may contain `key`: the greatest `i`
    /// with `key[i] <= key`, or 0 when every separator is larger.
    pub fn lookup_index(&self, key: &K) -> usize {
        match self.entries.get(1..) {
            Some(separators) => separators.partition_point(|(k, _)| k <= key),
            None => 0,
        }
    }

    pub fn lookup(&self, key: &K) -> PageId {
        self.child_at(self.lookup_index(key))
    }

    /// Insert `(key, new_child)` right after the slot pointing at `old_child`.
    ///
    /// Returns false if `old_child` is not a child of this node.
    pub fn insert_after(&mut self, old_child: PageId, key: K, new_child: PageId) -> bool {
        match self.child_index(old_child) {
            Some(index) => {
                self.entries.insert(index + 1, (key, new_child));
                true
            }
            None => false,
        }
    }

    pub fn remove_at(&mut self, index: usize) -> (K, PageId) {
        self.entries.remove(index)
    }

    /// Move the upper half of the children into a fresh sibling.
    ///
    /// This node keeps `ceil(n / 2)` children. The first key moving right is
    /// returned for promotion into the parent; the sibling keeps only a
    /// placeholder in its slot 0.
    pub fn split(&mut self, sibling_page_id: PageId) -> (K, InternalPage<K>) {
        let keep = self.entries.len().div_ceil(2);
        let mut sibling = InternalPage::new(sibling_page_id, self.parent_page_id, self.max_size);
        sibling.entries = self.entries.split_off(keep);
        let promoted = std::mem::take(&mut sibling.entries[0].0);
        (promoted, sibling)
    }

    /// Append every child of the right-hand neighbour; `middle_key` is the
    /// parent's separator between the two and replaces the right placeholder.
    pub fn merge_from(&mut self, middle_key: K, mut right: InternalPage<K>) {
        if let Some(first) = right.entries.first_mut() {
            first.0 = middle_key;
        }
        self.entries.extend(right.entries);
    }

    /// Rotate this node's last child into the front of its right neighbour.
    ///
    /// Returns the new parent separator and the child that changed parents.
    pub fn lend_last_to(
        &mut self,
        middle_key: K,
        right: &mut InternalPage<K>,
    ) -> Option<(K, PageId)> {
        if self.entries.len() < 2 {
            return None;
        }
        let (key, child) = self.entries.pop()?;
        if let Some(first) = right.entries.first_mut() {
            first.0 = middle_key;
        }
        right.entries.insert(0, (K::default(), child));
        Some((key, child))
    }

    /// Rotate the right neighbour's first child onto the end of this node.
    ///
    /// Returns the new parent separator and the child that changed parents.
    pub fn borrow_first_from(
        &mut self,
        middle_key: K,
        right: &mut InternalPage<K>,
    ) -> Option<(K, PageId)> {
        if right.entries.len() < 2 {
            return None;
        }
        let (_, child) = right.entries.remove(0);
        self.entries.push((middle_key, child));
        let separator = std::mem::take(&mut right.entries[0].0);
        Some((separator, child))
    }
}
