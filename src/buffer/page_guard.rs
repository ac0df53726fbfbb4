//! Scoped page handles.
//!
//! A guard bundles three things a caller would otherwise have to pair up by
//! hand: the pin that keeps the page resident, the page latch, and the
//! matching unpin.
//! - [`PageReadGuard`] - shared latch, unpins clean
//! - [`PageWriteGuard`] - exclusive latch, unpins dirty
//!
//! Release happens on drop or through `drop_guard()`. The latch is released
//! before the unpin, so a page is never evictable while someone still holds
//! its latch.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

use crate::common::{FrameId, PageId};
use crate::storage::page::Page;

use super::buffer_pool_manager::BufferPoolManager;

const RELEASED: &str = "page guard used after drop_guard()";

fn release(bpm: &BufferPoolManager, page_id: PageId, is_dirty: bool) {
    if let Err(e) = bpm.unpin_page(page_id, is_dirty) {
        warn!(%page_id, error = %e, "page guard release failed");
    }
}

/// Shared access to a pinned page.
///
/// Any number of read guards may exist for one page at a time.
///
/// # Example
/// ```ignore
/// let guard = bpm.fetch_page_read(page_id)?;
/// let data = guard.as_slice();
/// // guard drops here: latch released, page unpinned
/// ```
pub struct PageReadGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    /// `None` once released.
    latch: Option<RwLockReadGuard<'a, Page>>,
}

impl<'a> PageReadGuard<'a> {
    /// Called by `BufferPoolManager::fetch_page_read()` on a pinned frame.
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        latch: RwLockReadGuard<'a, Page>,
    ) -> Self {
        Self {
            bpm,
            frame_id,
            page_id,
            latch: Some(latch),
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Release the latch and the pin now. Calling it again does nothing.
    ///
    /// The guard must not be dereferenced afterwards.
    pub fn drop_guard(&mut self) {
        if let Some(latch) = self.latch.take() {
            drop(latch);
            release(self.bpm, self.page_id, false);
        }
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        self.latch.as_deref().expect(RELEASED)
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        self.drop_guard();
    }
}

/// Exclusive access to a pinned page.
///
/// The page is unpinned dirty on release whether or not it was modified.
///
/// # Example
/// ```ignore
/// let mut guard = bpm.fetch_page_write(page_id)?;
/// guard.as_mut_slice()[0] = 0xFF;
/// // guard drops here: latch released, page unpinned dirty
/// ```
pub struct PageWriteGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    /// `None` once released.
    latch: Option<RwLockWriteGuard<'a, Page>>,
}

impl<'a> PageWriteGuard<'a> {
    /// Called by `fetch_page_write()` / `new_page()` on a pinned frame.
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        latch: RwLockWriteGuard<'a, Page>,
    ) -> Self {
        Self {
            bpm,
            frame_id,
            page_id,
            latch: Some(latch),
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Release the latch and the pin now, marking the page dirty. Calling it
    /// again does nothing.
    ///
    /// The guard must not be dereferenced afterwards.
    pub fn drop_guard(&mut self) {
        if let Some(latch) = self.latch.take() {
            drop(latch);
            release(self.bpm, self.page_id, true);
        }
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        self.latch.as_deref().expect(RELEASED)
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        self.latch.as_deref_mut().expect(RELEASED)
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.drop_guard();
    }
}
