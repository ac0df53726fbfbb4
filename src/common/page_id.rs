//! Page identifier type.

use std::fmt;

use crate::common::config::HEADER_PAGE_ID;

/// Identifies a fixed-size block in the database file.
///
/// A `u32` addresses 4 billion pages (16TB with 4KB pages). Tree nodes refer
/// to each other by `PageId`, never by memory address, so links stay valid
/// while pages move in and out of the buffer pool.
///
/// # Example
/// ```
/// use crabtree::PageId;
///
/// let page_id = PageId::new(42);
/// assert!(page_id.is_valid());
/// assert!(!PageId::INVALID.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    /// Sentinel meaning "no page" (empty tree, end of leaf chain, no parent).
    pub const INVALID: PageId = PageId(u32::MAX);

    /// Location of the root directory.
    pub const HEADER: PageId = PageId(HEADER_PAGE_ID);

    /// Bytes occupied on a page (little-endian u32).
    pub const ENCODED_SIZE: usize = 4;

    #[inline]
    pub fn new(id: u32) -> Self {
        PageId(id)
    }

    /// Check if this page ID is valid (not the sentinel value).
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    #[inline]
    pub fn encode(&self, buf: &mut [u8]) {
        buf[..Self::ENCODED_SIZE].copy_from_slice(&self.0.to_le_bytes());
    }

    #[inline]
    pub fn decode(buf: &[u8]) -> Self {
        PageId(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Page({})", self.0)
        } else {
            write!(f, "Page(INVALID)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id_invalid() {
        assert!(!PageId::INVALID.is_valid());
        assert!(PageId::HEADER.is_valid());
        assert_eq!(PageId::HEADER, PageId::new(0));
    }

    #[test]
    fn test_page_id_encoding() {
        let mut buf = [0u8; 4];
        PageId::new(0x01020304).encode(&mut buf);
        assert_eq!(buf, [4, 3, 2, 1]);
        assert_eq!(PageId::decode(&buf), PageId::new(0x01020304));

        PageId::INVALID.encode(&mut buf);
        assert_eq!(PageId::decode(&buf), PageId::INVALID);
    }

    #[test]
    fn test_page_id_display() {
        assert_eq!(format!("{}", PageId::new(42)), "Page(42)");
        assert_eq!(format!("{}", PageId::INVALID), "Page(INVALID)");
    }
}
