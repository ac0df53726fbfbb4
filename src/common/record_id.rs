//! Record locator stored in B+Tree leaves.

use std::fmt;

use crate::common::PageId;

/// Locates a tuple: the heap page holding it plus a slot within that page.
///
/// The index never dereferences a `RecordId`; it only stores and returns it.
///
/// # Example
/// ```
/// use crabtree::{PageId, RecordId};
///
/// let rid = RecordId::new(PageId::new(3), 7);
/// let mut buf = [0u8; RecordId::ENCODED_SIZE];
/// rid.encode(&mut buf);
/// assert_eq!(RecordId::decode(&buf), rid);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot: u32,
}

impl RecordId {
    /// Bytes occupied on a page: page id then slot, both little-endian u32.
    pub const ENCODED_SIZE: usize = 8;

    #[inline]
    pub fn new(page_id: PageId, slot: u32) -> Self {
        Self { page_id, slot }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.page_id.0.to_le_bytes());
        buf[4..8].copy_from_slice(&self.slot.to_le_bytes());
    }

    pub fn decode(buf: &[u8]) -> Self {
        let page_id = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let slot = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Self {
            page_id: PageId::new(page_id),
            slot,
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rid({}, {})", self.page_id.0, self.slot)
    }
}
