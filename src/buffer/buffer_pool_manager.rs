//! Buffer Pool Manager - the page cache every index page goes through.
//!
//! The [`BufferPoolManager`] provides:
//! - Page caching between disk and memory in a fixed set of frames
//! - Pin counting, so pages in use are never evicted
//! - Dirty tracking with write-back on eviction and flush
//! - Pluggable eviction through the [`Replacer`] trait

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::buffer::replacer::{Replacer, ReplacerKind};
use crate::buffer::{BufferPoolStats, Frame, PageReadGuard, PageWriteGuard};
use crate::common::config::DEFAULT_POOL_SIZE;
use crate::common::{Error, FrameId, PageId, Result};
use crate::storage::DiskManager;

/// Page table, free list and replacer. Always locked as one unit.
struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    /// Frames holding no page, lowest id first.
    free_list: VecDeque<FrameId>,
    replacer: Box<dyn Replacer>,
}

/// Manages a pool of buffer frames for caching disk pages.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                    BufferPoolManager                        │
/// │  ┌─────────────── state: Mutex ──────────────┐              │
/// │  │ page_table   free_list   replacer         │              │
/// │  │ PageId→Fid   VecDeque    Box<dyn Replacer>│              │
/// │  └───────────────────────────────────────────┘              │
/// │  ┌───────────────────────────────────┐  ┌──────────────┐    │
/// │  │        frames: Vec<Frame>         │  │ disk_manager │    │
/// │  │  [Frame0] [Frame1] [Frame2] ...   │  │    Mutex     │    │
/// │  └───────────────────────────────────┘  └──────────────┘    │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// - `state`: one `Mutex` held for the whole of every fetch, new, unpin,
///   delete and flush bookkeeping step, so no thread ever sees the page
///   table, free list and replacer disagree
/// - `disk_manager`: `Mutex`, only ever taken after `state` when both are held
/// - `frames`: no lock of its own; each frame carries its page latch
/// - `stats`: atomic counters
///
/// Disk reads on a miss and write-backs of dirty victims run while `state` is
/// held. The latch of a pinned page is never waited on with `state` held: a
/// fetch pins the frame, releases `state`, then latches. Only unpinned frames
/// (free or chosen as victim) are latched under `state`, and guards release
/// their latch before they unpin, so nobody holds those.
///
/// # Usage
/// ```ignore
/// let dm = DiskManager::create("test.db")?;
/// let bpm = BufferPoolManager::new(10, dm);
///
/// let page_id = {
///     let mut guard = bpm.new_page()?;
///     guard.as_mut_slice()[0] = 0xAB;
///     guard.page_id()
/// };
///
/// let guard = bpm.fetch_page_read(page_id)?;
/// assert_eq!(guard.as_slice()[0], 0xAB);
/// ```
pub struct BufferPoolManager {
    frames: Vec<Frame>,
    state: Mutex<PoolState>,
    disk_manager: Mutex<DiskManager>,
    stats: BufferPoolStats,
}

impl BufferPoolManager {
    /// Create a buffer pool of `pool_size` frames with FIFO eviction.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize, disk_manager: DiskManager) -> Self {
        Self::with_replacer(pool_size, disk_manager, ReplacerKind::default())
    }

    /// Create a buffer pool of [`DEFAULT_POOL_SIZE`] frames with FIFO eviction.
    pub fn with_default_size(disk_manager: DiskManager) -> Self {
        Self::new(DEFAULT_POOL_SIZE, disk_manager)
    }

    /// Create a buffer pool with the given eviction policy.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn with_replacer(pool_size: usize, disk_manager: DiskManager, kind: ReplacerKind) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");

        Self {
            frames: (0..pool_size).map(|_| Frame::new()).collect(),
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                free_list: (0..pool_size).map(FrameId::new).collect(),
                replacer: kind.build(pool_size),
            }),
            disk_manager: Mutex::new(disk_manager),
            stats: BufferPoolStats::new(),
        }
    }

    // ========================================================================
    // Public API: Fetch pages
    // ========================================================================

    /// Fetch a page for reading (shared latch).
    ///
    /// Blocks while another thread holds the page's write latch.
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page doesn't exist on disk
    /// - `Error::NoFreeFrames` if the page isn't resident and every frame is pinned
    /// - I/O errors from loading the page
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame_id = self.pin_page(page_id)?;
        let latch = self.frames[frame_id.index()].read();
        Ok(PageReadGuard::new(self, frame_id, page_id, latch))
    }

    /// Fetch a page for writing (exclusive latch).
    ///
    /// The page is marked dirty when the guard is released.
    ///
    /// # Errors
    /// Same as [`fetch_page_read`](Self::fetch_page_read).
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.pin_page(page_id)?;
        let latch = self.frames[frame_id.index()].write();
        Ok(PageWriteGuard::new(self, frame_id, page_id, latch))
    }

    /// Like [`fetch_page_read`](Self::fetch_page_read), with any failure
    /// folded into `None`.
    pub fn checked_read_page(&self, page_id: PageId) -> Option<PageReadGuard<'_>> {
        self.fetch_page_read(page_id).ok()
    }

    /// Like [`fetch_page_write`](Self::fetch_page_write), with any failure
    /// folded into `None`.
    pub fn checked_write_page(&self, page_id: PageId) -> Option<PageWriteGuard<'_>> {
        self.fetch_page_write(page_id).ok()
    }

    // ========================================================================
    // Public API: Create and delete pages
    // ========================================================================

    /// Allocate a page on disk and return it pinned, zeroed and write-latched.
    ///
    /// A frame is secured before the page id is allocated, so a full pool
    /// does not consume page ids.
    ///
    /// # Errors
    /// - `Error::NoFreeFrames` if every frame is pinned
    /// - I/O errors from allocation or from writing back a victim
    pub fn new_page(&self) -> Result<PageWriteGuard<'_>> {
        let (frame_id, page_id) = {
            let mut state = self.state.lock();
            let frame_id = self.take_frame(&mut state)?;

            let page_id = match self.disk_manager.lock().allocate_page() {
                Ok(page_id) => page_id,
                Err(e) => {
                    state.free_list.push_back(frame_id);
                    return Err(e);
                }
            };

            self.frames[frame_id.index()].load(page_id, None);
            state.page_table.insert(page_id, frame_id);
            state.replacer.record_access(frame_id);
            (frame_id, page_id)
        };

        debug!(%page_id, %frame_id, "new page");
        let latch = self.frames[frame_id.index()].write();
        Ok(PageWriteGuard::new(self, frame_id, page_id, latch))
    }

    /// Allocate a page id on disk without bringing the page into the pool.
    ///
    /// The page reads back as zeros when fetched.
    pub fn allocate_page_id(&self) -> Result<PageId> {
        self.disk_manager.lock().allocate_page()
    }

    /// Delete a page from the pool and release its id on disk.
    ///
    /// A resident page's frame goes back to the free list without a
    /// write-back. The id is released on disk whether or not the page was
    /// resident.
    ///
    /// # Errors
    /// - `Error::PagePinned` if the page is resident and pinned
    /// - `Error::PageNotFound` if the page isn't allocated on disk
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.index()];
            if frame.is_pinned() {
                return Err(Error::PagePinned(page_id.0));
            }

            state.page_table.remove(&page_id);
            state.replacer.mark_unevictable(frame_id);
            frame.reset();
            state.free_list.push_back(frame_id);
        }

        self.disk_manager.lock().deallocate_page(page_id)?;
        debug!(%page_id, "deleted page");
        Ok(())
    }

    // ========================================================================
    // Public API: Unpin
    // ========================================================================

    /// Release one pin on a resident page.
    ///
    /// `is_dirty` is ORed into the frame's dirty flag. When the pin count
    /// reaches zero the frame becomes evictable. Guards call this on release;
    /// direct calls are for callers that pinned through a guard they then
    /// leaked on purpose.
    ///
    /// # Errors
    /// - `Error::PageNotResident` if the page isn't in the pool
    /// - `Error::PageNotPinned` if its pin count is already zero
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<()> {
        let mut state = self.state.lock();

        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(Error::PageNotResident(page_id.0))?;
        let frame = &self.frames[frame_id.index()];

        let remaining = frame.unpin().ok_or(Error::PageNotPinned(page_id.0))?;
        if is_dirty {
            frame.mark_dirty();
        }
        if remaining == 0 {
            state.replacer.mark_evictable(frame_id);
        }
        Ok(())
    }

    // ========================================================================
    // Public API: Flush pages
    // ========================================================================

    /// Write a resident dirty page to disk and clear its dirty flag.
    ///
    /// No-op for clean or non-resident pages. The page is read-latched for
    /// the duration of the write, so the caller must not hold its write
    /// guard. Flushing never changes the page's place in the eviction order.
    ///
    /// # Errors
    /// I/O errors from the write.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        let frame_id = {
            let state = self.state.lock();
            let Some(&frame_id) = state.page_table.get(&page_id) else {
                return Ok(());
            };
            let frame = &self.frames[frame_id.index()];
            if !frame.is_dirty() {
                return Ok(());
            }
            if !frame.is_pinned() {
                // Nobody can hold the latch of an unpinned frame, and the
                // replacer is left alone.
                return self.write_frame(frame_id, page_id);
            }
            // Already out of the replacer; one more pin keeps it that way.
            frame.pin();
            frame_id
        };

        let result = self.write_frame(frame_id, page_id);
        self.unpin_page(page_id, false)?;
        result
    }

    /// Flush every resident dirty page.
    ///
    /// # Errors
    /// Stops at the first I/O error.
    pub fn flush_all_pages(&self) -> Result<()> {
        let page_ids: Vec<PageId> = self.state.lock().page_table.keys().copied().collect();
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    // ========================================================================
    // Public API: Stats and info
    // ========================================================================

    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    /// Pin count of a resident page, or `None` if it isn't resident.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|frame_id| self.frames[frame_id.index()].pin_count())
    }

    pub fn contains_page(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Number of resident pages.
    pub fn page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Number of frames the replacer could evict right now.
    pub fn evictable_count(&self) -> usize {
        self.state.lock().replacer.size()
    }

    // ========================================================================
    // Internal: Pinning and frame allocation
    // ========================================================================

    /// Pin `page_id` into a frame, loading it on a miss.
    fn pin_page(&self, page_id: PageId) -> Result<FrameId> {
        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.frames[frame_id.index()].pin();
            state.replacer.mark_unevictable(frame_id);
            state.replacer.record_access(frame_id);
            self.stats.record_hit();
            trace!(%page_id, %frame_id, "buffer pool hit");
            return Ok(frame_id);
        }

        let frame_id = self.take_frame(&mut state)?;
        let page = match self.disk_manager.lock().read_page(page_id) {
            Ok(page) => page,
            Err(e) => {
                state.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        self.frames[frame_id.index()].load(page_id, Some(&page));
        state.page_table.insert(page_id, frame_id);
        state.replacer.record_access(frame_id);
        self.stats.record_miss();
        debug!(%page_id, %frame_id, "buffer pool miss");
        Ok(frame_id)
    }

    /// Write one frame's page to disk under its read latch and clear the
    /// dirty flag on success.
    fn write_frame(&self, frame_id: FrameId, page_id: PageId) -> Result<()> {
        let frame = &self.frames[frame_id.index()];
        let page = frame.read();
        self.disk_manager.lock().write_page(page_id, &page)?;
        // Still latched: no writer can slip in between write and clear.
        frame.clear_dirty();
        self.stats.record_write();
        Ok(())
    }

    /// Get an empty frame: the free list first, else an evicted victim.
    ///
    /// The returned frame is unmapped and tracked by nothing.
    fn take_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = state.replacer.victim().ok_or(Error::NoFreeFrames)?;
        let frame = &self.frames[frame_id.index()];

        if let Some(old_page_id) = frame.page_id() {
            if frame.is_dirty() {
                if let Err(e) = self.write_frame(frame_id, old_page_id) {
                    // Leave the victim cached, first in line again.
                    state.replacer.reinstate(frame_id);
                    return Err(e);
                }
                debug!(page_id = %old_page_id, %frame_id, "wrote back dirty victim");
            }
            state.page_table.remove(&old_page_id);
            debug!(page_id = %old_page_id, %frame_id, "evicted page");
        }

        frame.reset();
        self.stats.record_eviction();
        Ok(frame_id)
    }
}
