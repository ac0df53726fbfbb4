//! Page types and layouts.
//!
//! This module contains:
//! - [`Page`] - The raw 4KB data container
//! - [`PageHeader`] / [`PageType`] - Metadata at the start of every formatted page
//! - [`HeaderPage`] - The root directory (index name -> root page id)
//! - [`TreeNode`], [`LeafPage`], [`InternalPage`] - B+Tree node codecs

mod b_plus_tree_internal_page;
mod b_plus_tree_leaf_page;
mod b_plus_tree_page;
mod header_page;
#[allow(clippy::module_inception)]
mod page;
mod page_header;

pub use b_plus_tree_internal_page::InternalPage;
pub use b_plus_tree_leaf_page::LeafPage;
pub use b_plus_tree_page::{min_size_for, TreeNode, TreePageHeader};
pub use header_page::HeaderPage;
pub use page::Page;
pub use page_header::{PageHeader, PageType};
