//! Concurrent B+Tree index.
//!
//! Keys are unique and fixed-size ([`IndexKey`]); values are [`RecordId`]s.
//! Every node is one page fetched through the buffer pool, and an index's
//! root page id lives in the root directory on page 0 under the index name.
//!
//! # Concurrency
//! Readers crab down with shared latches, holding at most a parent and a
//! child at once. Writers crab down with exclusive latches and let go of
//! everything above a node that cannot split (insert) or underflow (remove).
//! Root changes are made with the root directory page still latched.
//!
//! [`RecordId`]: crate::common::RecordId

mod b_plus_tree;
mod context;
mod iterator;
mod key;

pub use b_plus_tree::BPlusTree;
pub use iterator::BPlusTreeIter;
pub use key::{GenericKey, IndexKey};
