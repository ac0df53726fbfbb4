//! Index structures built on the buffer pool.
//!
//! - [`btree`] - Concurrent B+Tree mapping fixed-size keys to record ids

pub mod btree;
