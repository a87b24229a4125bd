//! Buffer pointer manager.
//!
//! Owns the write pointer (scan-granular, always a multiple of 24), the read
//! pointer (word-granular), the current-half flag and the two half-ready
//! interrupt flags.
//!
//! ## Flag convention
//!
//! The flags are named after the half the *writer* has just entered, not the
//! half that is ready. `upper_half_ready` goes high when the write pointer
//! moves into the upper half, which means the **lower** half is complete and
//! safe to drain; `lower_half_ready` likewise announces the **upper** half.
//! [`PointerManager::ready_half`] performs that mapping.
//!
//! The writer recomputes both flags after every scan. The reader clears
//! `upper_half_ready` when it reads the last word of the lower half and
//! `lower_half_ready` when it reads the last word of the buffer.
//!
//! ## Overrun tracking
//!
//! Each half is `pending` from the moment the writer completes it until the
//! reader reads through its last word. Starting a scan at the first word of
//! a pending half counts an overrun: unread data is about to be replaced.
//! Overruns are reported, never back-pressured. A reader that consumes a half
//! the writer has not completed yet gets whatever the buffer holds; comparing
//! [`HalfStatus::generation`] before and after a drain detects a half that was
//! rewritten underneath it.

use tracing::{info, warn};

use crate::buffer::Half;
use crate::config::AcquisitionConfig;
use crate::CHANNEL_COUNT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HalfStatus {
    /// Completed by the writer and not yet read through
    pub pending: bool,
    /// Number of times the writer has completed this half
    pub generation: u64,
}

pub struct PointerManager {
    total_words: usize,
    half_words: usize,
    pub write_pointer: usize,
    pub read_pointer: usize,
    pub current_half: Half,
    pub upper_half_ready: bool,
    pub lower_half_ready: bool,
    halves: [HalfStatus; 2],
    overruns: u64,
    /// Sticky overrun status, cleared by [`PointerManager::clear_overrun`]
    pub overrun: bool,
}

impl PointerManager {
    pub fn new(config: &AcquisitionConfig) -> Self {
        PointerManager {
            total_words: config.total_words(),
            half_words: config.half_words(),
            write_pointer: 0,
            read_pointer: 0,
            current_half: Half::Lower,
            upper_half_ready: false,
            lower_half_ready: false,
            halves: [HalfStatus::default(); 2],
            overruns: 0,
            overrun: false,
        }
    }

    pub fn reset(&mut self) {
        let (total_words, half_words) = (self.total_words, self.half_words);
        *self = PointerManager {
            total_words,
            half_words,
            write_pointer: 0,
            read_pointer: 0,
            current_half: Half::Lower,
            upper_half_ready: false,
            lower_half_ready: false,
            halves: [HalfStatus::default(); 2],
            overruns: 0,
            overrun: false,
        };
    }

    pub fn total_words(&self) -> usize {
        self.total_words
    }

    pub fn half_words(&self) -> usize {
        self.half_words
    }

    /// Called before the first word of a scan. Returns true if this scan
    /// starts overwriting a half that was never drained.
    pub fn begin_scan(&mut self) -> bool {
        if self.write_pointer % self.half_words != 0 {
            return false;
        }
        let half = Half::of(self.write_pointer, self.half_words);
        if !self.halves[half.index()].pending {
            return false;
        }
        self.overruns += 1;
        self.overrun = true;
        warn!(?half, overruns = self.overruns, "overrun: writer re-entered an undrained half");
        true
    }

    /// Post-scan update: advance the write pointer by one scan with
    /// wraparound, then recompute the current half and both flags from the
    /// new position. Returns the half the writer just completed, if any.
    pub fn complete_scan(&mut self) -> Option<Half> {
        self.write_pointer = (self.write_pointer + CHANNEL_COUNT) % self.total_words;

        if self.write_pointer >= self.half_words {
            self.current_half = Half::Upper;
            self.upper_half_ready = true;
            self.lower_half_ready = false;
        } else {
            self.current_half = Half::Lower;
            self.lower_half_ready = true;
            self.upper_half_ready = false;
        }

        let completed = if self.write_pointer == self.half_words {
            Some(Half::Lower)
        } else if self.write_pointer == 0 {
            Some(Half::Upper)
        } else {
            None
        };
        if let Some(half) = completed {
            let status = &mut self.halves[half.index()];
            status.pending = true;
            status.generation += 1;
            info!(?half, generation = status.generation, "half-buffer complete");
        }
        completed
    }

    /// Consume one read transaction: returns the address to serve, advances
    /// the read pointer with wraparound and clears flags at the half ends.
    pub fn advance_read(&mut self) -> usize {
        let addr = self.read_pointer;
        if addr == self.half_words - 1 {
            self.upper_half_ready = false;
            self.halves[Half::Lower.index()].pending = false;
        }
        if addr == self.total_words - 1 {
            self.lower_half_ready = false;
            self.halves[Half::Upper.index()].pending = false;
        }
        self.read_pointer = (addr + 1) % self.total_words;
        addr
    }

    /// Half that the raised flag announces as ready to drain.
    pub fn ready_half(&self) -> Option<Half> {
        if self.upper_half_ready {
            Some(Half::Lower)
        } else if self.lower_half_ready {
            Some(Half::Upper)
        } else {
            None
        }
    }

    pub fn half_status(&self, half: Half) -> HalfStatus {
        self.halves[half.index()]
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    pub fn clear_overrun(&mut self) {
        self.overrun = false;
    }

    /// Capture state for save state.
    pub fn save_state(&self) -> crate::savestate::PointerSave {
        crate::savestate::PointerSave {
            write_pointer: self.write_pointer,
            read_pointer: self.read_pointer,
            current_half: self.current_half,
            upper_half_ready: self.upper_half_ready,
            lower_half_ready: self.lower_half_ready,
            pending: [self.halves[0].pending, self.halves[1].pending],
            generations: [self.halves[0].generation, self.halves[1].generation],
            overruns: self.overruns,
            overrun: self.overrun,
        }
    }

    /// Restore state from save state. Pointers are clamped into the buffer
    /// and the write pointer is realigned to a scan boundary.
    pub fn load_state(&mut self, s: &crate::savestate::PointerSave) {
        let wp = s.write_pointer % self.total_words;
        self.write_pointer = wp - wp % CHANNEL_COUNT;
        self.read_pointer = s.read_pointer % self.total_words;
        self.current_half = s.current_half;
        self.upper_half_ready = s.upper_half_ready;
        self.lower_half_ready = s.lower_half_ready;
        for i in 0..2 {
            self.halves[i] = HalfStatus { pending: s.pending[i], generation: s.generations[i] };
        }
        self.overruns = s.overruns;
        self.overrun = s.overrun;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(scans: usize) -> PointerManager {
        PointerManager::new(&AcquisitionConfig::with_buffer_scans(scans))
    }

    #[test]
    fn test_write_pointer_steps_by_scan_and_wraps() {
        let mut p = manager(4);
        let mut seen = Vec::new();
        for _ in 0..5 {
            p.complete_scan();
            assert_eq!(p.write_pointer % CHANNEL_COUNT, 0);
            seen.push(p.write_pointer);
        }
        assert_eq!(seen, vec![24, 48, 72, 0, 24]);
    }

    #[test]
    fn test_flag_inversion_across_halves() {
        let mut p = manager(4);
        p.complete_scan(); // wp=24, still lower
        assert!(p.lower_half_ready && !p.upper_half_ready);
        assert_eq!(p.current_half, Half::Lower);

        assert_eq!(p.complete_scan(), Some(Half::Lower)); // wp=48, entered upper
        assert!(p.upper_half_ready && !p.lower_half_ready);
        assert_eq!(p.current_half, Half::Upper);
        // upper flag announces the lower half
        assert_eq!(p.ready_half(), Some(Half::Lower));

        p.complete_scan(); // wp=72
        assert_eq!(p.complete_scan(), Some(Half::Upper)); // wp=0
        assert!(p.lower_half_ready && !p.upper_half_ready);
        assert_eq!(p.ready_half(), Some(Half::Upper));
    }

    #[test]
    fn test_read_clears_at_half_ends_and_wraps() {
        let mut p = manager(4);
        p.complete_scan();
        p.complete_scan();
        assert!(p.upper_half_ready);
        for _ in 0..47 { p.advance_read(); }
        assert!(p.upper_half_ready);
        assert_eq!(p.advance_read(), 47);
        assert!(!p.upper_half_ready);
        assert!(!p.half_status(Half::Lower).pending);

        p.lower_half_ready = true;
        for _ in 48..95 { p.advance_read(); }
        assert!(p.lower_half_ready);
        assert_eq!(p.advance_read(), 95);
        assert!(!p.lower_half_ready);
        assert_eq!(p.read_pointer, 0);
    }

    #[test]
    fn test_overrun_only_at_pending_half_start() {
        let mut p = manager(4);
        for _ in 0..4 {
            assert!(!p.begin_scan());
            p.complete_scan();
        }
        assert_eq!(p.half_status(Half::Lower).generation, 1);
        assert_eq!(p.half_status(Half::Upper).generation, 1);
        // wp back at 0 with the lower half never read
        assert!(p.begin_scan());
        assert_eq!(p.overruns(), 1);
        assert!(p.overrun);
        p.clear_overrun();
        assert!(!p.overrun);
        assert_eq!(p.overruns(), 1);
    }
}
