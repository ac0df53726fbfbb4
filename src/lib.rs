//! crabtree - a disk-backed, concurrent B+Tree index over a buffer pool.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          crabtree                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                 Index Layer (index/)                     │   │
//! │  │     BPlusTree: latch crabbing, splits, merges, scans     │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Buffer Pool (buffer/)                     │   │
//! │  │   BufferPoolManager + Frame + page guards + stats        │   │
//! │  │   Eviction: FIFO over unpin order | second-chance CLOCK  │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                 Storage Layer (storage/)                 │   │
//! │  │   DiskManager + Page + PageHeader + node/directory codecs│   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, RecordId, Error, config)
//! - [`storage`] - Disk I/O and page formats
//! - [`buffer`] - Buffer pool management and eviction policies
//! - [`index`] - The B+Tree
//!
//! # Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use crabtree::{BPlusTree, BufferPoolManager, DiskManager, IndexOptions, PageId, RecordId};
//!
//! let dm = DiskManager::open_or_create("my_index.db")?;
//! let bpm = Arc::new(BufferPoolManager::with_default_size(dm));
//!
//! let tree = match BPlusTree::<u64>::open("users", bpm.clone(), IndexOptions::new(64, 64)) {
//!     Ok(tree) => tree,
//!     Err(_) => BPlusTree::create("users", bpm.clone(), IndexOptions::new(64, 64))?,
//! };
//! tree.insert(1, RecordId::new(PageId::new(10), 0))?;
//! bpm.flush_all_pages()?;
//! # Ok::<(), crabtree::Error>(())
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::PAGE_SIZE;
pub use common::{Error, FrameId, IndexOptions, PageId, RecordId, Result};

pub use buffer::{BufferPoolManager, BufferPoolStats, ReplacerKind, StatsSnapshot};
pub use index::btree::{BPlusTree, BPlusTreeIter, GenericKey, IndexKey};
pub use storage::page::{Page, PageHeader, PageType};
pub use storage::DiskManager;
