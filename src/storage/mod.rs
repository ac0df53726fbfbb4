//! Storage layer - disk I/O and page formats.
//!
//! - [`DiskManager`] - Page and log file I/O
//! - [`page`] - Raw pages and the on-page layouts built on them

mod disk_manager;
pub mod page;

pub use disk_manager::DiskManager;
