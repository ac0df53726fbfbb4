//! FIFO-over-unpin replacement policy.
//!
//! Frames are queued the first time they become evictable and leave the
//! queue when pinned again or chosen as a victim. Fetching a page has no
//! effect on its position, so this is neither LRU nor a reference-bit clock.

use hashlink::LinkedHashSet;

use crate::common::FrameId;

use super::Replacer;

/// Evicts the frame that has been evictable the longest.
///
/// Re-marking a frame that is already evictable keeps its place in line.
pub struct FifoReplacer {
    /// Evictable frames, oldest at the front.
    queue: LinkedHashSet<FrameId>,
}

impl FifoReplacer {
    /// Create a new FIFO replacer.
    pub fn new() -> Self {
        Self {
            queue: LinkedHashSet::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: LinkedHashSet::with_capacity(capacity),
        }
    }
}

impl Default for FifoReplacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Replacer for FifoReplacer {
    fn mark_evictable(&mut self, frame_id: FrameId) {
        // `insert` would move an existing entry to the back.
        if !self.queue.contains(&frame_id) {
            self.queue.insert(frame_id);
        }
    }

    fn mark_unevictable(&mut self, frame_id: FrameId) {
        self.queue.remove(&frame_id);
    }

    fn victim(&mut self) -> Option<FrameId> {
        self.queue.pop_front()
    }

    fn reinstate(&mut self, frame_id: FrameId) {
        self.queue.insert(frame_id);
        self.queue.to_front(&frame_id);
    }

    fn size(&self) -> usize {
        self.queue.len()
    }
}
