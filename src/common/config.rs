//! Configuration constants and tunables.

use crate::common::{Error, Result};
use crate::index::btree::IndexKey;
use crate::storage::page::{InternalPage, LeafPage};

/// Size of a page in bytes (4KB).
///
/// Matches the OS page size on most systems, so a page maps onto a single
/// block for direct I/O.
pub const PAGE_SIZE: usize = 4096;

/// Page holding the root directory (index name -> root page id).
///
/// The directory is always the first page allocated in a database file.
pub const HEADER_PAGE_ID: u32 = 0;

/// Frame count of [`BufferPoolManager::with_default_size`](crate::buffer::BufferPoolManager::with_default_size).
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Longest index name the root directory can store, in bytes.
pub const MAX_INDEX_NAME_LEN: usize = 32;

/// Fan-out limits for a B+Tree.
///
/// `leaf_max_size` counts (key, record) pairs; `internal_max_size` counts
/// child pointers. A node splits once it would hold more than its maximum and
/// must hold at least `ceil(max / 2)` entries unless it is the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOptions {
    pub leaf_max_size: usize,
    pub internal_max_size: usize,
}

impl IndexOptions {
    pub fn new(leaf_max_size: usize, internal_max_size: usize) -> Self {
        Self {
            leaf_max_size,
            internal_max_size,
        }
    }

    /// Largest fan-out a page can physically hold for key type `K`.
    pub fn page_capacity<K: IndexKey>() -> Self {
        Self {
            leaf_max_size: LeafPage::<K>::capacity(),
            internal_max_size: InternalPage::<K>::capacity(),
        }
    }

    /// Check the limits against what a page can hold for key type `K`.
    pub fn validate<K: IndexKey>(&self) -> Result<()> {
        let capacity = Self::page_capacity::<K>();

        if self.leaf_max_size < 2 {
            return Err(Error::InvalidConfig(format!(
                "leaf_max_size must be at least 2, got {}",
                self.leaf_max_size
            )));
        }
        if self.internal_max_size < 3 {
            return Err(Error::InvalidConfig(format!(
                "internal_max_size must be at least 3, got {}",
                self.internal_max_size
            )));
        }
        if self.leaf_max_size > capacity.leaf_max_size {
            return Err(Error::InvalidConfig(format!(
                "leaf_max_size {} exceeds page capacity {}",
                self.leaf_max_size, capacity.leaf_max_size
            )));
        }
        if self.internal_max_size > capacity.internal_max_size {
            return Err(Error::InvalidConfig(format!(
                "internal_max_size {} exceeds page capacity {}",
                self.internal_max_size, capacity.internal_max_size
            )));
        }
        Ok(())
    }
}
