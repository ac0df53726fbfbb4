//! B+Tree leaf node.
//!
//! Leaves hold unique keys in ascending order, each paired with the
//! [`RecordId`] of the tuple it indexes, plus a forward link to the next leaf
//! so range scans never revisit the internal levels.
//!
//! ```text
//! | tree header (29) | next_page_id (4) | KEY(0)+RID(0) | KEY(1)+RID(1) | ...
//! ```

use crate::common::{Error, PageId, RecordId, Result};
use crate::common::config::PAGE_SIZE;
use crate::index::btree::IndexKey;

use super::b_plus_tree_page::{min_size_for, TreePageHeader};
use super::page::Page;
use super::page_header::PageType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafPage<K: IndexKey> {
    page_id: PageId,
    parent_page_id: PageId,
    max_size: usize,
    next_page_id: PageId,
    entries: Vec<(K, RecordId)>,
}

impl<K: IndexKey> LeafPage<K> {
    pub const OFFSET_NEXT: usize = TreePageHeader::END;
    pub const HEADER_SIZE: usize = Self::OFFSET_NEXT + PageId::ENCODED_SIZE;
    const ENTRY_SIZE: usize = K::ENCODED_SIZE + RecordId::ENCODED_SIZE;

    /// Most entries that fit in one page for this key type.
    pub fn capacity() -> usize {
        (PAGE_SIZE - Self::HEADER_SIZE) / Self::ENTRY_SIZE
    }

    pub fn new(page_id: PageId, parent_page_id: PageId, max_size: usize) -> Self {
        Self {
            page_id,
            parent_page_id,
            max_size,
            next_page_id: PageId::INVALID,
            entries: Vec::with_capacity(max_size + 1),
        }
    }

    pub fn decode(page: &Page) -> Result<Self> {
        let header = TreePageHeader::read(page);
        if header.page_type != PageType::BTreeLeaf {
            return Err(Error::corrupt(header.page_id.0, "not a leaf page"));
        }
        if !page.verify_checksum() {
            return Err(Error::ChecksumMismatch(header.page_id.0));
        }
        let size = header.size as usize;
        if size > Self::capacity() {
            return Err(Error::corrupt(
                header.page_id.0,
                format!("leaf size {} exceeds capacity {}", size, Self::capacity()),
            ));
        }

        let data = page.as_slice();
        let mut entries = Vec::with_capacity(header.max_size as usize + 1);
        for i in 0..size {
            let offset = Self::HEADER_SIZE + i * Self::ENTRY_SIZE;
            let key = K::decode(&data[offset..]);
            let rid = RecordId::decode(&data[offset + K::ENCODED_SIZE..]);
            entries.push((key, rid));
        }

        Ok(Self {
            page_id: header.page_id,
            parent_page_id: header.parent_page_id,
            max_size: header.max_size as usize,
            next_page_id: PageId::decode(&data[Self::OFFSET_NEXT..]),
            entries,
        })
    }

    /// Serialize into `page`. Callers split before a leaf outgrows its page.
    pub fn write_to(&self, page: &mut Page) {
        debug_assert!(self.entries.len() <= Self::capacity());

        TreePageHeader {
            page_type: PageType::BTreeLeaf,
            size: self.entries.len() as u32,
            max_size: self.max_size as u32,
            parent_page_id: self.parent_page_id,
            page_id: self.page_id,
        }
        .write_to(page);

        let data = page.as_mut_slice();
        self.next_page_id.encode(&mut data[Self::OFFSET_NEXT..]);
        for (i, (key, rid)) in self.entries.iter().enumerate() {
            let offset = Self::HEADER_SIZE + i * Self::ENTRY_SIZE;
            key.encode(&mut data[offset..]);
            rid.encode(&mut data[offset + K::ENCODED_SIZE..]);
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

    pub fn next_page_id(&self) -> PageId {
        self.next_page_id
    }

    pub fn set_next_page_id(&mut self, next_page_id: PageId) {
        self.next_page_id = next_page_id;
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

    pub fn entry_at(&self, index: usize) -> (K, RecordId) {
        self.entries[index]
    }

    pub fn entries(&self) -> &[(K, RecordId)] {
        &self.entries
    }

    /// Position of the first entry whose key is `>= key`.
    pub fn lower_bound(&self, key: &K) -> usize {
        self.entries.partition_point(|(k, _)| k < key)
    }

    pub fn lookup(&self, key: &K) -> Option<RecordId> {
        self.entries
            .binary_search_by(|(k, _)| k.cmp(key))
            .ok()
            .map(|index| self.entries[index].1)
    }

    /// Insert in sorted position. Returns false if the key already exists.
    ///
    /// The leaf may briefly hold `max_size + 1` entries; the caller splits it
    /// before writing it back.
    pub fn insert(&mut self, key: K, rid: RecordId) -> bool {
        match self.entries.binary_search_by(|(k, _)| k.cmp(&key)) {
            Ok(_) => false,
            Err(index) => {
                self.entries.insert(index, (key, rid));
                true
            }
        }
    }

    pub fn remove(&mut self, key: &K) -> Option<RecordId> {
        match self.entries.binary_search_by(|(k, _)| k.cmp(key)) {
            Ok(index) => Some(self.entries.remove(index).1),
            Err(_) => None,
        }
    }

    /// Move the upper half of the entries into a fresh sibling.
    ///
    /// This leaf keeps `ceil(n / 2)` entries, the sibling takes the rest and
    /// is spliced into the leaf chain right after this leaf.
    pub fn split(&mut self, sibling_page_id: PageId) -> LeafPage<K> {
        let keep = self.entries.len().div_ceil(2);
        let mut sibling = LeafPage::new(sibling_page_id, self.parent_page_id, self.max_size);
        sibling.entries = self.entries.split_off(keep);
        sibling.next_page_id = self.next_page_id;
        self.next_page_id = sibling_page_id;
        sibling
    }

    /// Append every entry of the right-hand neighbour and take over its link.
    pub fn merge_from(&mut self, right: LeafPage<K>) {
        self.entries.extend(right.entries);
        self.next_page_id = right.next_page_id;
    }

    /// Move this leaf's last entry to the front of its right neighbour.
    ///
    /// Returns the new separator key between the two leaves.
    pub fn lend_last_to(&mut self, right: &mut LeafPage<K>) -> Option<K> {
        let entry = self.entries.pop()?;
        right.entries.insert(0, entry);
        Some(entry.0)
    }

    /// Move the right neighbour's first entry to the end of this leaf.
    ///
    /// Returns the new separator key between the two leaves.
    pub fn borrow_first_from(&mut self, right: &mut LeafPage<K>) -> Option<K> {
        if right.entries.len() < 2 {
            return None;
        }
        let entry = right.entries.remove(0);
        self.entries.push(entry);
        Some(right.entries[0].0)
    }
}
