//! Forward scans over the leaf chain.

use std::iter::FusedIterator;
use std::ops::Bound;

use crate::buffer::{BufferPoolManager, PageReadGuard};
use crate::common::{RecordId, Result};
use crate::index::btree::IndexKey;
use crate::storage::page::LeafPage;

/// Iterator over `(key, record)` pairs in key order.
///
/// Holds a shared latch on the leaf it is positioned in. Moving on latches
/// the next leaf before the current one is released, so a concurrent merge
/// can never free the page the iterator is about to visit. Errors end the
/// iteration after being yielded once.
pub struct BPlusTreeIter<'a, K: IndexKey> {
    bpm: &'a BufferPoolManager,
    current: Option<(PageReadGuard<'a>, LeafPage<K>)>,
    index: usize,
    end: Bound<K>,
}

impl<'a, K: IndexKey> BPlusTreeIter<'a, K> {
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        current: Option<(PageReadGuard<'a>, LeafPage<K>)>,
        index: usize,
        end: Bound<K>,
    ) -> Self {
        Self {
            bpm,
            current,
            index,
            end,
        }
    }

    fn past_end(&self, key: &K) -> bool {
        match &self.end {
            Bound::Included(end) => key > end,
            Bound::Excluded(end) => key >= end,
            Bound::Unbounded => false,
        }
    }

    fn finish(&mut self) {
        self.current = None;
    }
}

impl<K: IndexKey> Iterator for BPlusTreeIter<'_, K> {
    type Item = Result<(K, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (_, leaf) = self.current.as_ref()?;

            if self.index < leaf.len() {
                let (key, rid) = leaf.entry_at(self.index);
                if self.past_end(&key) {
                    self.finish();
                    return None;
                }
                self.index += 1;
                return Some(Ok((key, rid)));
            }

            let next_page_id = leaf.next_page_id();
            if !next_page_id.is_valid() {
                self.finish();
                return None;
            }

            let next = self.bpm.fetch_page_read(next_page_id).and_then(|guard| {
                let leaf = LeafPage::decode(&guard)?;
                Ok((guard, leaf))
            });
            match next {
                // Replacing `current` releases the old leaf after the new one
                // is latched.
                Ok(next) => {
                    self.current = Some(next);
                    self.index = 0;
                }
                Err(e) => {
                    self.finish();
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<K: IndexKey> FusedIterator for BPlusTreeIter<'_, K> {}
