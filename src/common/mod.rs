//! Common types and utilities shared across crabtree.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and index options
//! - Error types
//! - Identifiers (PageId, FrameId, RecordId)

pub mod config;
pub mod error;
mod frame_id;
mod page_id;
mod record_id;

pub use config::IndexOptions;
pub use error::{Error, Result};
pub use frame_id::FrameId;
pub use page_id::PageId;
pub use record_id::RecordId;
