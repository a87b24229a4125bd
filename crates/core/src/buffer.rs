//! Scan buffer: a flat array of 16-bit words holding `buffer_scans` scans.
//!
//! | Word range                     | Content                  |
//! |--------------------------------|--------------------------|
//! | `0 .. half_words`              | lower half               |
//! | `half_words .. total_words`    | upper half               |
//!
//! Scan `n` occupies words `n*24 .. n*24+24`, channel order 0..23. The buffer
//! has one write port (used by the scan writer) and one read port (used by
//! the host read port); nothing else touches the words.

use serde::{Deserialize, Serialize};

use crate::CHANNEL_COUNT;

/// One of the two ping-pong partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Half {
    Lower,
    Upper,
}

impl Half {
    /// Half containing word `addr`.
    pub fn of(addr: usize, half_words: usize) -> Half {
        if addr < half_words { Half::Lower } else { Half::Upper }
    }

    pub fn index(self) -> usize {
        match self {
            Half::Lower => 0,
            Half::Upper => 1,
        }
    }
}

pub struct ScanBuffer {
    words: Vec<u16>,
}

impl ScanBuffer {
    pub fn new(scans: usize) -> Self {
        ScanBuffer { words: vec![0u16; scans * CHANNEL_COUNT] }
    }

    /// Capacity in words.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Write port. Returns the previous word, or `None` if `addr` is out of range.
    #[inline]
    pub fn write(&mut self, addr: usize, word: u16) -> Option<u16> {
        self.words.get_mut(addr).map(|slot| std::mem::replace(slot, word))
    }

    /// Read port. Out-of-range addresses read as zero.
    #[inline]
    pub fn read(&self, addr: usize) -> u16 {
        self.words.get(addr).copied().unwrap_or(0)
    }

    /// The 24 words of scan `index`, if it exists.
    pub fn scan(&self, index: usize) -> Option<&[u16]> {
        let start = index.checked_mul(CHANNEL_COUNT)?;
        self.words.get(start..start + CHANNEL_COUNT)
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Replace the contents from a save state. Length must match.
    pub fn restore(&mut self, words: &[u16]) -> bool {
        if words.len() != self.words.len() {
            return false;
        }
        self.words.copy_from_slice(words);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry() {
        let buf = ScanBuffer::new(4);
        assert_eq!(buf.len(), 96);
        assert!(!buf.is_empty());
        assert_eq!(Half::of(47, 48), Half::Lower);
        assert_eq!(Half::of(48, 48), Half::Upper);
    }

    #[test]
    fn test_write_returns_previous() {
        let mut buf = ScanBuffer::new(2);
        assert_eq!(buf.write(5, 0x1234), Some(0));
        assert_eq!(buf.write(5, 0x5678), Some(0x1234));
        assert_eq!(buf.read(5), 0x5678);
        assert_eq!(buf.write(48, 1), None);
        assert_eq!(buf.read(48), 0);
    }

    #[test]
    fn test_scan_slices() {
        let mut buf = ScanBuffer::new(2);
        buf.write(24, 7);
        assert_eq!(buf.scan(1).map(|s| s[0]), Some(7));
        assert!(buf.scan(2).is_none());
    }
}
