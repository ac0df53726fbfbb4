//! Second-chance clock replacement policy.

use crate::common::FrameId;

use super::Replacer;

/// Clock sweep over every frame in the pool.
///
/// Each frame has a reference bit set by [`Replacer::record_access`]. The hand
/// skips frames that are not evictable; an evictable frame with its bit set
/// loses the bit and survives, the first one found without it is the victim.
/// Two full turns always find a victim when any frame is evictable.
pub struct ClockReplacer {
    evictable: Vec<bool>,
    referenced: Vec<bool>,
    hand: usize,
    size: usize,
}

impl ClockReplacer {
    /// Create a clock over frames `0..num_frames`.
    pub fn new(num_frames: usize) -> Self {
        Self {
            evictable: vec![false; num_frames],
            referenced: vec![false; num_frames],
            hand: 0,
            size: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.evictable.len()
    }

    fn advance(&mut self) {
        self.hand = (self.hand + 1) % self.evictable.len();
    }
}

impl Replacer for ClockReplacer {
    fn record_access(&mut self, frame_id: FrameId) {
        if let Some(bit) = self.referenced.get_mut(frame_id.index()) {
            *bit = true;
        }
    }

    fn mark_evictable(&mut self, frame_id: FrameId) {
        if let Some(slot) = self.evictable.get_mut(frame_id.index()) {
            if !*slot {
                *slot = true;
                self.size += 1;
            }
        }
    }

    fn mark_unevictable(&mut self, frame_id: FrameId) {
        if let Some(slot) = self.evictable.get_mut(frame_id.index()) {
            if *slot {
                *slot = false;
                self.size -= 1;
            }
        }
    }

    fn victim(&mut self) -> Option<FrameId> {
        if self.size == 0 {
            return None;
        }

        for _ in 0..2 * self.evictable.len() {
            let hand = self.hand;
            self.advance();

            if !self.evictable[hand] {
                continue;
            }
            if self.referenced[hand] {
                self.referenced[hand] = false;
                continue;
            }

            self.evictable[hand] = false;
            self.size -= 1;
            return Some(FrameId::new(hand));
        }
        None
    }

    fn reinstate(&mut self, frame_id: FrameId) {
        if frame_id.index() < self.evictable.len() {
            self.mark_evictable(frame_id);
            // Point the hand back at it; its reference bit is already clear.
            self.hand = frame_id.index();
        }
    }

    fn size(&self) -> usize {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fid(n: usize) -> FrameId {
        FrameId::new(n)
    }

    #[test]
    fn test_clock_new() {
        let replacer = ClockReplacer::new(10);
        assert_eq!(replacer.capacity(), 10);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_clock_empty_has_no_victim() {
        let mut replacer = ClockReplacer::new(4);
        assert_eq!(replacer.victim(), None);

        replacer.record_access(fid(1));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_clock_mark_is_idempotent() {
        let mut replacer = ClockReplacer::new(4);
        replacer.mark_evictable(fid(1));
        replacer.mark_evictable(fid(1));
        assert_eq!(replacer.size(), 1);

        replacer.mark_unevictable(fid(1));
        replacer.mark_unevictable(fid(1));
        assert_eq!(replacer.size(), 0);

        // Out of range ids are ignored.
        replacer.mark_evictable(fid(99));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_clock_gives_second_chance() {
        let mut replacer = ClockReplacer::new(3);
        for i in 0..3 {
            replacer.mark_evictable(fid(i));
        }
        replacer.record_access(fid(0));

        // Frame 0 is referenced, so the hand clears its bit and moves on.
        assert_eq!(replacer.victim(), Some(fid(1)));
        assert_eq!(replacer.victim(), Some(fid(2)));
        assert_eq!(replacer.victim(), Some(fid(0)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_clock_all_referenced_still_finds_victim() {
        let mut replacer = ClockReplacer::new(3);
        for i in 0..3 {
            replacer.record_access(fid(i));
            replacer.mark_evictable(fid(i));
        }

        assert_eq!(replacer.victim(), Some(fid(0)));
        assert_eq!(replacer.size(), 2);
    }

    #[test]
    fn test_clock_reinstate_rewinds_hand() {
        let mut replacer = ClockReplacer::new(3);
        for i in 0..3 {
            replacer.mark_evictable(fid(i));
        }
        replacer.record_access(fid(2));

        let victim = replacer.victim().unwrap();
        assert_eq!(victim, fid(0));
        replacer.reinstate(victim);

        assert_eq!(replacer.size(), 3);
        assert_eq!(replacer.victim(), Some(fid(0)));
        assert_eq!(replacer.victim(), Some(fid(1)));
    }

    #[test]
    fn test_clock_skips_pinned_frames() {
        let mut replacer = ClockReplacer::new(3);
        replacer.mark_evictable(fid(0));
        replacer.mark_evictable(fid(2));
        replacer.mark_unevictable(fid(0));

        assert_eq!(replacer.victim(), Some(fid(2)));
        assert_eq!(replacer.victim(), None);
    }
}
