//! Error types for crabtree.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in crabtree.
///
/// Every failure is reported to the immediate caller; nothing here is fatal
/// and nothing is retried internally.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page was never allocated or has been deallocated.
    #[error("Page {0} not found")]
    PageNotFound(u32),

    /// Buffer pool has no free frames and the replacer has no victim.
    ///
    /// This happens when all frames are pinned.
    #[error("No free frames available in buffer pool")]
    NoFreeFrames,

    /// Unpin of a page that is not cached in the buffer pool.
    #[error("Page {0} is not resident in the buffer pool")]
    PageNotResident(u32),

    /// Attempted to unpin a page whose pin count is already zero.
    ///
    /// This indicates a bug - unpinning should match pinning.
    #[error("Page {0} is not pinned")]
    PageNotPinned(u32),

    /// Attempted to delete a page that is still pinned.
    #[error("Page {0} is still pinned")]
    PagePinned(u32),

    /// The CRC stored in a page header does not match its contents.
    #[error("Checksum mismatch on page {0}")]
    ChecksumMismatch(u32),

    /// The root directory page has no room for another index.
    #[error("Root directory is full")]
    DirectoryFull,

    /// Index name is empty, too long for a directory record, or contains NUL.
    #[error("Invalid index name: {0:?}")]
    InvalidIndexName(String),

    /// An index with this name is already registered.
    #[error("Index {0:?} already exists")]
    IndexExists(String),

    /// No root directory record exists for the index.
    #[error("Index {0:?} not found")]
    IndexNotFound(String),

    /// Rejected configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A page failed to decode or broke a structural expectation.
    #[error("Corrupt page {page}: {reason}")]
    CorruptPage { page: u32, reason: String },
}

impl Error {
    pub(crate) fn corrupt(page: u32, reason: impl Into<String>) -> Self {
        Error::CorruptPage {
            page,
            reason: reason.into(),
        }
    }
}
