//! Disk Manager - synchronous file I/O for pages and the log channel.
//!
//! The [`DiskManager`] is the only code that touches the database file:
//! - Reading and writing whole pages by id
//! - Allocating page ids, and recycling ids released by `deallocate_page`
//! - An append-only log file kept next to the database file

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;

/// Manages disk I/O for a single database file and its log.
///
/// # File Layout
/// Pages are laid out back to back, so page N lives at offset `N × PAGE_SIZE`:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Page 0  │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │ (4KB)   │ (4KB)   │ (4KB)   │         │ (4KB)   │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// ```
///
/// The log lives in a sibling file with a `.log` extension.
///
/// # Thread Safety
/// `DiskManager` is **single-threaded**. The `BufferPoolManager` serializes
/// access to it.
///
/// # Contents
/// Pages are stored exactly as given. Page checksums belong to the codecs
/// that format tree and directory pages, not to this layer.
///
/// # Free pages
/// Deallocated ids are remembered in memory and handed out again, lowest
/// first. The set is not persisted: after a restart, freed pages stay
/// allocated on disk until overwritten.
pub struct DiskManager {
    file: File,
    log: File,
    log_path: PathBuf,
    /// Number of pages in the file.
    page_count: u32,
    free_pages: BTreeSet<u32>,
    num_writes: u64,
    num_flushes: u64,
}

impl DiskManager {
    /// Create a new database file (and its log file).
    ///
    /// # Errors
    /// Returns an error if the database file already exists or cannot be
    /// created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path.as_ref())?;
        Self::with_file(path.as_ref(), file, 0)
    }

    /// Open an existing database file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path.as_ref())?;

        // A torn trailing page is not addressable.
        let file_size = file.metadata()?.len();
        let page_count = (file_size / PAGE_SIZE as u64) as u32;

        Self::with_file(path.as_ref(), file, page_count)
    }

    /// Open an existing database file, or create if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    fn with_file(path: &Path, file: File, page_count: u32) -> Result<Self> {
        let log_path = path.with_extension("log");
        let log = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&log_path)?;

        Ok(Self {
            file,
            log,
            log_path,
            page_count,
            free_pages: BTreeSet::new(),
            num_writes: 0,
            num_flushes: 0,
        })
    }

    // ========================================================================
    // Pages
    // ========================================================================

    /// Read a page from disk.
    ///
    /// # Errors
    /// `Error::PageNotFound` if the page was never allocated or was freed.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Page> {
        self.check_allocated(page_id)?;

        self.file.seek(SeekFrom::Start(Self::offset_of(page_id)))?;
        let mut page = Page::new();
        self.file.read_exact(page.as_mut_slice())?;
        Ok(page)
    }

    /// Write a page to disk.
    ///
    /// The page must have been allocated with `allocate_page()`.
    ///
    /// # Durability
    /// Calls `sync_data()` before returning.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page isn't allocated.
    pub fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        self.check_allocated(page_id)?;

        self.file.seek(SeekFrom::Start(Self::offset_of(page_id)))?;
        self.file.write_all(page.as_slice())?;
        self.file.sync_data()?;

        self.num_writes += 1;
        Ok(())
    }

    /// Allocate a page and return its id.
    ///
    /// Reuses the lowest deallocated id if any, otherwise extends the file.
    /// Either way the page reads back as zeros.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        let page_id = match self.free_pages.pop_first() {
            Some(id) => PageId::new(id),
            None => {
                if self.page_count == PageId::INVALID.0 {
                    return Err(Error::Io(std::io::Error::other("page id space exhausted")));
                }
                let id = PageId::new(self.page_count);
                self.page_count += 1;
                id
            }
        };

        self.file.seek(SeekFrom::Start(Self::offset_of(page_id)))?;
        self.file.write_all(&[0u8; PAGE_SIZE])?;

        Ok(page_id)
    }

    /// Release a page id for reuse by a later `allocate_page()`.
    ///
    /// # Errors
    /// Returns `Error::PageNotFound` if the page isn't allocated.
    pub fn deallocate_page(&mut self, page_id: PageId) -> Result<()> {
        self.check_allocated(page_id)?;
        self.free_pages.insert(page_id.0);
        Ok(())
    }

    /// Whether `page_id` names a live page.
    pub fn is_allocated(&self, page_id: PageId) -> bool {
        page_id.0 < self.page_count && !self.free_pages.contains(&page_id.0)
    }

    fn check_allocated(&self, page_id: PageId) -> Result<()> {
        if self.is_allocated(page_id) {
            Ok(())
        } else {
            Err(Error::PageNotFound(page_id.0))
        }
    }

    #[inline]
    fn offset_of(page_id: PageId) -> u64 {
        (page_id.0 as u64) * (PAGE_SIZE as u64)
    }

    // ========================================================================
    // Log
    // ========================================================================

    /// Append `data` to the log file and sync it.
    pub fn write_log(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.log.write_all(data)?;
        self.log.sync_data()?;
        self.num_flushes += 1;
        Ok(())
    }

    /// Read log bytes starting at `offset` into `buf`.
    ///
    /// Returns how many bytes came from the log. Whatever part of `buf` the
    /// log could not fill, including everything on a read past the end, is
    /// zeroed.
    pub fn read_log(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        let log_len = self.log.metadata()?.len();
        if offset >= log_len {
            buf.fill(0);
            return Ok(0);
        }

        self.log.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            match self.log.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        buf[filled..].fill(0);
        Ok(filled)
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Get the number of pages in the database file, freed ones included.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Get the total size of the database file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        (self.page_count as u64) * (PAGE_SIZE as u64)
    }

    /// Page writes since this manager was opened.
    #[inline]
    pub fn num_writes(&self) -> u64 {
        self.num_writes
    }

    /// Log flushes since this manager was opened.
    #[inline]
    pub fn num_flushes(&self) -> u64 {
        self.num_flushes
    }
}
