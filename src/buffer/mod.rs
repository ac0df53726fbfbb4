//! Buffer pool management.
//!
//! The buffer pool is the only path between the index and the disk. It keeps
//! a fixed set of frames, maps resident page ids onto them, and evicts
//! unpinned pages when it needs room.
//!
//! # Components
//! - [`BufferPoolManager`] - The page cache
//! - [`Frame`] - A slot holding one page plus its pin count, dirty flag and latch
//! - [`PageReadGuard`] / [`PageWriteGuard`] - Scoped pin + latch handles
//! - [`BufferPoolStats`] - Hit, miss, eviction and I/O counters
//! - [`replacer`] - Eviction policies

mod buffer_pool_manager;
mod frame;
mod page_guard;
pub mod replacer;
mod stats;

pub use buffer_pool_manager::BufferPoolManager;
pub use frame::Frame;
pub use page_guard::{PageReadGuard, PageWriteGuard};
pub use replacer::ReplacerKind;
pub use stats::{BufferPoolStats, StatsSnapshot};
