//! Shared header and tagged node type for B+Tree pages.
//!
//! Leaf and internal nodes share the same prefix after the generic
//! [`PageHeader`]; the page type byte says which layout follows.
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       13    PageHeader (page_type = BTreeLeaf | BTreeInternal)
//! 13      4     size (current entry count)
//! 17      4     max_size
//! 21      4     parent_page_id (INVALID for the root)
//! 25      4     page_id
//! ```

use crate::common::{Error, PageId, Result};
use crate::index::btree::IndexKey;

use super::b_plus_tree_internal_page::InternalPage;
use super::b_plus_tree_leaf_page::LeafPage;
use super::page::Page;
use super::page_header::{PageHeader, PageType};

/// Decoded view of the shared tree-node header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreePageHeader {
    pub page_type: PageType,
    pub size: u32,
    pub max_size: u32,
    pub parent_page_id: PageId,
    pub page_id: PageId,
}

impl TreePageHeader {
    pub const OFFSET_SIZE: usize = PageHeader::SIZE;
    pub const OFFSET_MAX_SIZE: usize = Self::OFFSET_SIZE + 4;
    pub const OFFSET_PARENT: usize = Self::OFFSET_MAX_SIZE + 4;
    pub const OFFSET_PAGE_ID: usize = Self::OFFSET_PARENT + 4;
    /// First byte past the shared header.
    pub const END: usize = Self::OFFSET_PAGE_ID + 4;

    pub fn read(page: &Page) -> Self {
        let data = page.as_slice();
        Self {
            page_type: page.page_type(),
            size: read_u32(data, Self::OFFSET_SIZE),
            max_size: read_u32(data, Self::OFFSET_MAX_SIZE),
            parent_page_id: PageId::decode(&data[Self::OFFSET_PARENT..]),
            page_id: PageId::decode(&data[Self::OFFSET_PAGE_ID..]),
        }
    }

    pub fn write_to(&self, page: &mut Page) {
        page.set_page_type(self.page_type);
        let data = page.as_mut_slice();
        data[Self::OFFSET_SIZE..Self::OFFSET_SIZE + 4].copy_from_slice(&self.size.to_le_bytes());
        data[Self::OFFSET_MAX_SIZE..Self::OFFSET_MAX_SIZE + 4]
            .copy_from_slice(&self.max_size.to_le_bytes());
        self.parent_page_id.encode(&mut data[Self::OFFSET_PARENT..]);
        self.page_id.encode(&mut data[Self::OFFSET_PAGE_ID..]);
    }

    /// Rewrite only the parent link of an already formatted node.
    pub fn set_parent_in_place(page: &mut Page, parent_page_id: PageId) {
        parent_page_id.encode(&mut page.as_mut_slice()[Self::OFFSET_PARENT..]);
        page.stamp_checksum();
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.page_type == PageType::BTreeLeaf
    }
}

#[inline]
pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

/// Smallest legal entry count for a non-root node: `ceil(max / 2)`.
#[inline]
pub fn min_size_for(max_size: usize) -> usize {
    max_size.div_ceil(2)
}

/// A decoded B+Tree node, keyed by the page type byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode<K: IndexKey> {
    Leaf(LeafPage<K>),
    Internal(InternalPage<K>),
}

impl<K: IndexKey> TreeNode<K> {
    pub fn decode(page: &Page) -> Result<Self> {
        match page.page_type() {
            PageType::BTreeLeaf => Ok(TreeNode::Leaf(LeafPage::decode(page)?)),
            PageType::BTreeInternal => Ok(TreeNode::Internal(InternalPage::decode(page)?)),
            other => {
                let header = TreePageHeader::read(page);
                Err(Error::corrupt(
                    header.page_id.0,
                    format!("expected a B+Tree node, found {:?}", other),
                ))
            }
        }
    }

    pub fn write_to(&self, page: &mut Page) {
        match self {
            TreeNode::Leaf(leaf) => leaf.write_to(page),
            TreeNode::Internal(internal) => internal.write_to(page),
        }
    }

    pub fn page_id(&self) -> PageId {
        match self {
            TreeNode::Leaf(leaf) => leaf.page_id(),
            TreeNode::Internal(internal) => internal.page_id(),
        }
    }

    pub fn parent_page_id(&self) -> PageId {
        match self {
            TreeNode::Leaf(leaf) => leaf.parent_page_id(),
            TreeNode::Internal(internal) => internal.parent_page_id(),
        }
    }

    pub fn set_parent_page_id(&mut self, parent_page_id: PageId) {
        match self {
            TreeNode::Leaf(leaf) => leaf.set_parent_page_id(parent_page_id),
            TreeNode::Internal(internal) => internal.set_parent_page_id(parent_page_id),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            TreeNode::Leaf(leaf) => leaf.len(),
            TreeNode::Internal(internal) => internal.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_size(&self) -> usize {
        match self {
            TreeNode::Leaf(leaf) => leaf.max_size(),
            TreeNode::Internal(internal) => internal.max_size(),
        }
    }

    pub fn min_size(&self) -> usize {
        min_size_for(self.max_size())
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, TreeNode::Leaf(_))
    }
}
