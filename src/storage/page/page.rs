//! Page - the fundamental 4KB unit of storage.
//!
//! A [`Page`] is a raw 4KB byte array that serves as the unit of I/O
//! between disk and memory. Pages live inside buffer pool frames.

use crate::common::config::PAGE_SIZE;

use super::page_header::{PageHeader, PageType};

/// A page of data (4KB, 4KB-aligned).
///
/// `Page` does not implement `Clone`; copying 4KB should be explicit, so use
/// [`Page::copy_from`] instead.
///
/// # Example
/// ```
/// use crabtree::storage::page::Page;
///
/// let mut page = Page::new();
/// page.as_mut_slice()[0] = 0xFF;
/// assert_eq!(page.as_slice()[0], 0xFF);
/// ```
#[repr(align(4096))]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    /// Create a new zeroed page.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero out the entire page.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Overwrite this page with the bytes of another.
    pub fn copy_from(&mut self, other: &Page) {
        self.data.copy_from_slice(&other.data);
    }

    #[inline]
    pub const fn size() -> usize {
        PAGE_SIZE
    }

    pub fn header(&self) -> PageHeader {
        PageHeader::from_bytes(&self.data)
    }

    #[inline]
    pub fn page_type(&self) -> PageType {
        PageType::from_u8(self.data[PageHeader::OFFSET_PAGE_TYPE])
    }

    /// Format the page as `page_type`, keeping the LSN and zeroing the checksum.
    pub fn set_page_type(&mut self, page_type: PageType) {
        let mut header = self.header();
        header.page_type = page_type;
        header.checksum = 0;
        header.write_to(&mut self.data);
    }

    /// Stamp the CRC32 of the current contents into the header.
    ///
    /// Codecs call this after their last write to a formatted page.
    pub fn stamp_checksum(&mut self) {
        PageHeader::stamp_checksum(&mut self.data);
    }

    /// Whether the stamped CRC32 matches the current contents.
    pub fn verify_checksum(&self) -> bool {
        self.header().verify_checksum(&self.data)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}
