//! Eviction policies (replacers).
//!
//! A replacer tracks which frames currently hold an unpinned page and picks
//! the next one to evict. It never sees page ids or page bytes; the
//! [`BufferPoolManager`](crate::buffer::BufferPoolManager) drives it under its
//! own mutex, so implementations take `&mut self` and need no locking.
//!
//! Policies:
//! - [`FifoReplacer`] - evicts the frame that was unpinned longest ago (default)
//! - [`ClockReplacer`] - second-chance clock sweep over reference bits

mod clock;
mod fifo;

pub use clock::ClockReplacer;
pub use fifo::FifoReplacer;

use crate::common::FrameId;

/// Page replacement policy over a fixed set of frames.
pub trait Replacer: Send {
    /// Note that a frame's page was just fetched.
    ///
    /// Policies that ignore access history keep the default no-op.
    fn record_access(&mut self, _frame_id: FrameId) {}

    /// Add a frame to the evictable set. No-op if it is already there.
    fn mark_evictable(&mut self, frame_id: FrameId);

    /// Remove a frame from the evictable set. No-op if it is absent.
    fn mark_unevictable(&mut self, frame_id: FrameId);

    /// Remove and return one evictable frame, or `None` if there are none.
    ///
    /// The returned frame is no longer tracked.
    fn victim(&mut self) -> Option<FrameId>;

    /// Put back a frame just returned by [`victim`](Self::victim) that could
    /// not be evicted after all, so it is the next victim again.
    fn reinstate(&mut self, frame_id: FrameId);

    /// Number of evictable frames.
    fn size(&self) -> usize;
}

/// Which [`Replacer`] a buffer pool is built with.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ReplacerKind {
    /// Evict in the order frames became evictable.
    #[default]
    Fifo,
    /// Second-chance clock: recently fetched frames survive one sweep.
    Clock,
}

impl ReplacerKind {
    /// Build a replacer sized for `pool_size` frames.
    pub fn build(self, pool_size: usize) -> Box<dyn Replacer> {
        match self {
            ReplacerKind::Fifo => Box::new(FifoReplacer::with_capacity(pool_size)),
            ReplacerKind::Clock => Box::new(ClockReplacer::new(pool_size)),
        }
    }
}
